use serde::Deserialize;
use std::fs;
use std::path::Path;
use treedown_core::{Options, compile};

#[derive(Debug, Deserialize)]
struct Case {
    name: String,
    markdown: String,
    html: String,
}

#[test]
fn conformance_cases() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let cases_path = root.join("tests/conformance/cases.json");
    let json = fs::read_to_string(&cases_path).expect("read cases.json");
    let cases: Vec<Case> = serde_json::from_str(&json).expect("parse cases.json");

    let mut failures = Vec::new();
    for case in &cases {
        let result = compile(&case.markdown, &Options::new()).expect("compile");
        if result.output != case.html {
            failures.push(format!(
                "case `{}`:\n  input:    {:?}\n  expected: {:?}\n  actual:   {:?}",
                case.name, case.markdown, case.html, result.output
            ));
        }
    }
    if !failures.is_empty() {
        panic!("{} case(s) failed:\n{}", failures.len(), failures.join("\n"));
    }
}
