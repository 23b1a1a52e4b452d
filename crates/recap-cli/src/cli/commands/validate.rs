use recap_core::config::load_unchecked;
use recap_core::errors::Diagnostic;
use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::cli::commands::exit_codes;

pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let (diagnostics, has_errors) = match load_unchecked(&args.config, args.system_config.as_deref()) {
        Ok(loaded) => {
            let has_errors = loaded.has_errors();
            (loaded.diagnostics, has_errors)
        }
        Err(e) => (vec![e.to_diagnostic().with_source("config")], true),
    };

    let exit_code = if has_errors {
        exit_codes::CONFIG_ERROR
    } else {
        exit_codes::SUCCESS
    };
    print_report(&diagnostics, &args, exit_code)?;
    Ok(exit_code)
}

fn print_report(diagnostics: &[Diagnostic], args: &ValidateArgs, exit_code: i32) -> anyhow::Result<()> {
    match args.format {
        OutputFormat::Json => {
            let out = json!({
                "schema_version": 1,
                "config": args.config,
                "ok": exit_code == exit_codes::SUCCESS,
                "exit_code": exit_code,
                "diagnostics": diagnostics,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            // Human-readable output goes to stderr
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            let warnings = diagnostics.len() - errors;

            for d in diagnostics {
                eprintln!("{}", d.format_terminal());
            }

            if errors > 0 {
                eprintln!(
                    "\n✖ Validation failed ({} errors, {} warnings)",
                    errors, warnings
                );
            } else if warnings > 0 {
                eprintln!("\n⚠️  Validation passed with warnings ({})", warnings);
            } else {
                eprintln!("✔ Validation OK");
            }
        }
    }
    Ok(())
}
