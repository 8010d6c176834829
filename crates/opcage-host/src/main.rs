//! opcage host CLI.
//!
//! - `opcage-host report <policy> [out]`: resolved-policy report
//! - `opcage-host check <policy> <image>`: validate an image, no execution
//! - `opcage-host run <policy> <image> <entry> [int args...]`: prepare and
//!   execute with a fresh guard

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use tracing_subscriber::{fmt, EnvFilter};

use opcage_core::image::codec;
use opcage_core::policy::AccessFilter;
use opcage_host::engine::Value;
use opcage_host::host::SandboxHost;
use opcage_host::validate::Validator;
use opcage_host::{config, report};

fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("report") => cmd_report(&args[2..]),
        Some("check") => cmd_check(&args[2..]),
        Some("run") => cmd_run(&args[2..]),
        _ => {
            eprintln!("usage: opcage-host report <policy> [out]");
            eprintln!("       opcage-host check <policy> <image>");
            eprintln!("       opcage-host run <policy> <image> <entry> [int args...]");
            ExitCode::from(2)
        }
    }
}

fn cmd_report(args: &[String]) -> ExitCode {
    let Some(policy_path) = args.first() else {
        eprintln!("report: missing policy path");
        return ExitCode::from(2);
    };
    let (policy, _) = config::load_from_file(policy_path).expect("policy load failed");

    match args.get(1) {
        Some(out_path) => {
            let mut out = Vec::new();
            report::write_policy_report(&policy, &mut out).expect("report failed");
            fs::write(out_path, out).expect("write report failed");
        }
        None => {
            let mut stdout = std::io::stdout();
            report::write_policy_report(&policy, &mut stdout).expect("report failed");
        }
    }
    ExitCode::SUCCESS
}

fn cmd_check(args: &[String]) -> ExitCode {
    let (Some(policy_path), Some(image_path)) = (args.first(), args.get(1)) else {
        eprintln!("check: expected <policy> <image>");
        return ExitCode::from(2);
    };
    let (policy, _) = config::load_from_file(policy_path).expect("policy load failed");
    let image = fs::read(image_path).expect("image read failed");

    let outcome = codec::decode_program(Bytes::from(image)).and_then(|program| {
        let filter = AccessFilter::new(&policy);
        Validator::new(&filter).validate_program(&program)
    });
    match outcome {
        Ok(()) => {
            println!("{}", serde_json::json!({ "ok": true }));
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!(
                "{}",
                serde_json::json!({
                    "ok": false,
                    "kind": e.kind().as_str(),
                    "error": e.to_string(),
                })
            );
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(args: &[String]) -> ExitCode {
    let (Some(policy_path), Some(image_path), Some(entry)) =
        (args.first(), args.get(1), args.get(2))
    else {
        eprintln!("run: expected <policy> <image> <entry> [int args...]");
        return ExitCode::from(2);
    };
    let (policy, settings) = config::load_from_file(policy_path).expect("policy load failed");
    let image = fs::read(image_path).expect("image read failed");

    let mut values = Vec::new();
    for raw in &args[3..] {
        match raw.parse::<i64>() {
            Ok(v) => values.push(Value::Int(v)),
            Err(_) => {
                eprintln!("run: argument {raw} is not an integer");
                return ExitCode::from(2);
            }
        }
    }

    let host = SandboxHost::new(Arc::new(policy), settings);
    let outcome = host
        .prepare_image(Bytes::from(image))
        .and_then(|name| host.run(&name, entry, values));
    match outcome {
        Ok(value) => {
            println!("{value:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", e.kind().as_str());
            ExitCode::FAILURE
        }
    }
}
