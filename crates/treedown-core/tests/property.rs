use std::panic;

use treedown_core::{Node, Options, compile, parse};

const CASES: usize = 200;
const MAX_LEN: usize = 512;
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 \
\n\t#>*`~^|[](){}!<>:+-_=./\\\\\"&;";

#[test]
fn parser_never_panics_on_random_input() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x7f4a_2d91_13b4_55a1);
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_string(&mut rng, len);
        let result = panic::catch_unwind(|| parse(&source, &Options::new()));
        if result.is_err() {
            return Err(format!("parse panicked for case {}: {:?}", case, source).into());
        }
    }
    Ok(())
}

#[test]
fn compile_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x91d4_2f8e_c1a3_044f);
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_string(&mut rng, len);
        let first = compile(&source, &Options::new())?;
        let second = compile(&source, &Options::new())?;
        if first.output != second.output {
            return Err(format!(
                "output differs between runs for case {}:\n---\n{}\n---",
                case, source
            )
            .into());
        }
        if first.root != second.root {
            return Err(format!("tree differs between runs for case {}", case).into());
        }
    }
    Ok(())
}

#[test]
fn spans_stay_within_the_source() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x2b1c_98aa_7d40_3e17);
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_string(&mut rng, len);
        let parsed = parse(&source, &Options::new());
        if let Err(message) = check_spans(&parsed.root, source.len()) {
            return Err(format!(
                "span check failed for case {}: {}\nSource:\n---\n{}\n---",
                case, message, source
            )
            .into());
        }
    }
    Ok(())
}

fn check_spans(node: &Node, source_len: usize) -> Result<(), String> {
    if node.span.start > node.span.end {
        return Err(format!("inverted span {:?}", node.span));
    }
    if node.span.end > source_len {
        return Err(format!(
            "span {:?} past end of source ({})",
            node.span, source_len
        ));
    }
    for child in &node.children {
        check_spans(child, source_len)?;
    }
    Ok(())
}

fn random_string(rng: &mut Lcg, len: usize) -> String {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let idx = rng.gen_range(0, CHARSET.len());
        out.push(CHARSET[idx] as char);
    }
    out
}

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 16
    }

    fn gen_range(&mut self, low: usize, high: usize) -> usize {
        low + (self.next() as usize) % (high - low)
    }
}
