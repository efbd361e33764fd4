//! Command line front end for OTP generators on a NEOWAVE token
//!
//! Usage:
//! ```bash
//! cargo run --example otp_cli -- list
//! cargo run --example otp_cli -- add alice:github TOTP JBSWY3DPEHPK3PXP SHA256 8 30
//! RUST_LOG=debug cargo run --example otp_cli -- watch
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use neo_otp::secret::{decode_base32, generate_seed};
use neo_otp::{
    Algorithm, BackendConfig, Generator, NewGenerator, OtpBackend, OtpType, TokenEvent,
    TokenService,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let command = args[1].as_str();
    let command_args = &args[2..];

    // Seeds are generated locally, no token needed
    if command == "seed" {
        seed(command_args);
        return;
    }

    let backend = OtpBackend::new(BackendConfig::default());

    let result = match command {
        "list" => list(&backend),
        "code" => code(&backend, command_args),
        "add" => add(&backend, command_args),
        "delete" => delete(&backend, command_args),
        "watch" => watch(backend),
        _ => {
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("OTP generator management");
    println!();
    println!("Usage: {} <command> [args...]", program);
    println!();
    println!("Commands:");
    println!("  list                                   List generators with current TOTP codes");
    println!("  code <label>                           Generate a code (advances HOTP counters)");
    println!("  add <label> <TOTP|HOTP> <base32> [algo] [digits] [param]");
    println!("                                         Enroll a generator; param is the TOTP");
    println!("                                         period or the HOTP initial counter");
    println!("  delete <label>                         Remove a generator");
    println!("  seed [algo]                            Print a random base32 seed");
    println!("  watch                                  Follow presence and codes until Ctrl-C");
}

fn find(backend: &OtpBackend, label: &str) -> Result<Generator, String> {
    backend
        .list_generators()
        .map_err(|e| e.to_string())?
        .into_iter()
        .find(|g| g.label == label)
        .ok_or_else(|| format!("No generator named {}", label))
}

fn list(backend: &OtpBackend) -> Result<(), String> {
    let generators = backend.list_generators().map_err(|e| e.to_string())?;
    if generators.is_empty() {
        println!("No generators on the token");
        return Ok(());
    }

    for generator in generators {
        let code = match generator.otp_type {
            OtpType::Totp => backend
                .generate_code(&generator.label, generator.otp_type, generator.period)
                .unwrap_or_else(|e| format!("({})", e)),
            OtpType::Hotp => Generator::code_placeholder().to_string(),
        };
        println!("{:<10} {}", code, generator.label);
    }
    Ok(())
}

fn code(backend: &OtpBackend, args: &[String]) -> Result<(), String> {
    let label = args.first().ok_or("Missing <label>")?;
    let generator = find(backend, label)?;

    let code = backend
        .generate_code(&generator.label, generator.otp_type, generator.period)
        .map_err(|e| e.to_string())?;

    println!("{}", generator.describe());
    println!();
    println!("Code: {}", code);
    Ok(())
}

fn add(backend: &OtpBackend, args: &[String]) -> Result<(), String> {
    let [label, otp_type, secret, rest @ ..] = args else {
        return Err("Usage: add <label> <TOTP|HOTP> <base32> [algo] [digits] [param]".into());
    };

    let otp_type: OtpType = otp_type.parse().map_err(|e: neo_otp::Error| e.to_string())?;
    let secret = decode_base32(secret).map_err(|e| e.to_string())?;

    let mut new = match otp_type {
        OtpType::Totp => NewGenerator::totp(label.as_str(), secret),
        OtpType::Hotp => NewGenerator::hotp(label.as_str(), secret),
    };

    if let Some(algorithm) = rest.first() {
        let algorithm: Algorithm = algorithm.parse().map_err(|e: neo_otp::Error| e.to_string())?;
        new = new.with_algorithm(algorithm);
    }
    if let Some(digits) = rest.get(1) {
        let digits = digits
            .parse()
            .map_err(|_| format!("Invalid digits: {}", digits))?;
        new = new.with_digits(digits);
    }
    if let Some(param) = rest.get(2) {
        new = match otp_type {
            OtpType::Totp => new.with_period(
                param
                    .parse()
                    .map_err(|_| format!("Invalid period: {}", param))?,
            ),
            OtpType::Hotp => new.with_counter(
                param
                    .parse()
                    .map_err(|_| format!("Invalid counter: {}", param))?,
            ),
        };
    }

    backend.create_generator(&new).map_err(|e| e.to_string())?;
    println!("✓ Created {} generator {}", new.otp_type, new.label);
    Ok(())
}

fn delete(backend: &OtpBackend, args: &[String]) -> Result<(), String> {
    let label = args.first().ok_or("Missing <label>")?;
    backend.delete_generator(label).map_err(|e| e.to_string())?;
    println!("✓ Deleted {}", label);
    Ok(())
}

fn seed(args: &[String]) {
    let algorithm = match args.first().map(|a| a.parse::<Algorithm>()) {
        None => Algorithm::default(),
        Some(Ok(algorithm)) => algorithm,
        Some(Err(e)) => {
            eprintln!("❌ {}", e);
            process::exit(1);
        }
    };
    println!("{}", generate_seed(algorithm));
}

fn watch(backend: OtpBackend) -> Result<(), String> {
    let (mut service, events) = TokenService::new(Arc::new(backend));
    service.start().map_err(|e| e.to_string())?;

    println!("Watching for token events, Ctrl-C to quit");
    for event in events {
        match event {
            TokenEvent::DeviceStatus(true) => println!("🔑 Token connected"),
            TokenEvent::DeviceStatus(false) => println!("   Token disconnected"),
            TokenEvent::DataReady(entries) => {
                println!();
                for entry in entries {
                    println!("{:<10} {}", entry.code, entry.generator.label);
                }
            }
            TokenEvent::Error(message) => eprintln!("❌ {}", message),
        }
    }

    service.stop();
    Ok(())
}
