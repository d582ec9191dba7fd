use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use treedown_core::{
    AttrValue, Diagnostic, DiagnosticSeverity, Node, Options, compile, compile_sanitized,
};

fn main() {
    let mut input: Option<String> = None;
    let mut sanitized = false;
    let mut print_ast = false;
    let mut options = Options::new();
    let mut diagnostics_mode: Option<DiagnosticsMode> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "--sanitized" => sanitized = true,
            "--ast" => print_ast = true,
            "--force-block" => options.force_block = true,
            "--force-inline" => options.force_inline = true,
            "--no-raw-html" => options.disable_parsing_raw_html = true,
            "--diagnostics" => {
                let mode = match args.next().as_deref() {
                    Some("json") => DiagnosticsMode::Json,
                    Some("pretty") => DiagnosticsMode::Pretty,
                    _ => {
                        eprintln!("--diagnostics expects: json | pretty");
                        print_usage();
                        process::exit(2);
                    }
                };
                diagnostics_mode = Some(mode);
            }
            _ => {
                if input.is_none() {
                    input = Some(arg);
                } else {
                    eprintln!("unexpected argument: {}", arg);
                    print_usage();
                    process::exit(2);
                }
            }
        }
    }

    let source = match input {
        Some(path) => fs::read_to_string(&path).unwrap_or_else(|err| {
            eprintln!("failed to read {}: {}", path, err);
            process::exit(1);
        }),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .unwrap_or_else(|err| {
                    eprintln!("failed to read stdin: {}", err);
                    process::exit(1);
                });
            buffer
        }
    };

    let result = if sanitized {
        compile_sanitized(&source, &options)
    } else {
        compile(&source, &options)
    };
    let result = result.unwrap_or_else(|err| {
        eprintln!("configuration error: {}", err);
        process::exit(2);
    });

    if let Some(mode) = diagnostics_mode {
        emit_diagnostics(&result.diagnostics, mode);
    }

    if print_ast {
        let mut out = String::new();
        node_to_json(&result.root, 0, &mut out);
        out.push('\n');
        print!("{}", out);
    } else {
        print!("{}", result.output);
    }

    if result
        .diagnostics
        .iter()
        .any(|diag| diag.severity == DiagnosticSeverity::Error)
    {
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!(
        "Usage: treedown-cli [--sanitized] [--ast] [--force-block] [--force-inline] [--no-raw-html] [--diagnostics json|pretty] [input]"
    );
}

#[derive(Clone, Copy)]
enum DiagnosticsMode {
    Json,
    Pretty,
}

fn emit_diagnostics(diagnostics: &[Diagnostic], mode: DiagnosticsMode) {
    if diagnostics.is_empty() {
        if let DiagnosticsMode::Json = mode {
            eprintln!("[]");
        }
        return;
    }
    match mode {
        DiagnosticsMode::Json => {
            eprintln!("{}", diagnostics_to_json(diagnostics));
        }
        DiagnosticsMode::Pretty => {
            for diagnostic in diagnostics {
                eprintln!("{}", diagnostic_to_pretty(diagnostic));
            }
        }
    }
}

fn diagnostic_to_pretty(diagnostic: &Diagnostic) -> String {
    let severity = match diagnostic.severity {
        DiagnosticSeverity::Error => "error",
        DiagnosticSeverity::Warning => "warning",
    };
    let start_line = diagnostic.range.start.line + 1;
    let start_col = diagnostic.range.start.character + 1;
    format!(
        "{}:{}:{} {} {}",
        start_line, start_col, severity, diagnostic.code, diagnostic.message
    )
}

fn diagnostics_to_json(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    out.push_str("[\n");
    for (idx, diag) in diagnostics.iter().enumerate() {
        out.push_str("  {\n");
        out.push_str(&format!("    \"code\": \"{}\",\n", diag.code));
        out.push_str(&format!(
            "    \"severity\": \"{}\",\n",
            severity_label(diag.severity)
        ));
        out.push_str(&format!(
            "    \"message\": \"{}\",\n",
            escape_json(&diag.message)
        ));
        out.push_str("    \"range\": {\n");
        out.push_str(&format!(
            "      \"start\": {{ \"line\": {}, \"character\": {} }},\n",
            diag.range.start.line, diag.range.start.character
        ));
        out.push_str(&format!(
            "      \"end\": {{ \"line\": {}, \"character\": {} }}\n",
            diag.range.end.line, diag.range.end.character
        ));
        out.push_str("    }\n  }");
        if idx + 1 < diagnostics.len() {
            out.push_str(",\n");
        } else {
            out.push('\n');
        }
    }
    out.push(']');
    out
}

fn node_to_json(node: &Node, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    out.push_str(&pad);
    out.push_str("{\n");
    out.push_str(&format!("{pad}  \"type\": \"{}\"", node.kind.name()));
    if !node.attrs.is_empty() {
        out.push_str(&format!(",\n{pad}  \"attrs\": {{ "));
        let mut first = true;
        for (key, value) in node.attrs.iter() {
            if !first {
                out.push_str(", ");
            }
            first = false;
            match value {
                AttrValue::Str(text) => {
                    out.push_str(&format!("\"{}\": \"{}\"", key, escape_json(text)));
                }
                AttrValue::Int(number) => {
                    out.push_str(&format!("\"{}\": {}", key, number));
                }
                AttrValue::Bool(flag) => {
                    out.push_str(&format!("\"{}\": {}", key, flag));
                }
            }
        }
        out.push_str(" }");
    }
    if !node.children.is_empty() {
        out.push_str(&format!(",\n{pad}  \"children\": [\n"));
        for (idx, child) in node.children.iter().enumerate() {
            node_to_json(child, indent + 2, out);
            if idx + 1 < node.children.len() {
                out.push(',');
            }
            out.push('\n');
        }
        out.push_str(&format!("{pad}  ]"));
    }
    out.push('\n');
    out.push_str(&pad);
    out.push('}');
}

fn severity_label(severity: DiagnosticSeverity) -> &'static str {
    match severity {
        DiagnosticSeverity::Error => "error",
        DiagnosticSeverity::Warning => "warning",
    }
}

fn escape_json(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
