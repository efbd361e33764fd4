//! Session reuse, invalidation and discovery against an in-memory token

mod common;

use common::{
    CMD_ENUMERATE, CMD_GENERATE, FakeToken, Fault, Stored, eventually, init_logger, test_config,
};

use neo_otp::{BackendConfig, Error, OtpBackend, OtpType};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_session_is_reused_across_commands() {
    init_logger();
    let token = FakeToken::with_generators(3);
    let backend = token.backend(10);

    for _ in 0..5 {
        backend.list_generators().unwrap();
    }

    assert_eq!(token.opens(), 1);
    assert_eq!(token.enumerations(), 1);
    assert!(backend.executor().connected_endpoint().is_some());
}

#[test]
fn test_every_command_is_preceded_by_a_probe() {
    init_logger();
    let token = FakeToken::with_generators(1);
    let backend = token.backend(10);

    backend
        .generate_code_at("user000:issuer", OtpType::Totp, Some(30), 60)
        .unwrap();

    let calls = token.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, CMD_ENUMERATE);
    assert_eq!(calls[0].1.get_u64(2).unwrap(), 0);
    assert_eq!(calls[1].0, CMD_GENERATE);
}

#[test]
fn test_commands_never_overlap_on_the_wire() {
    init_logger();
    let token = FakeToken::with_generators(4);
    token.set_delay(Duration::from_millis(5));
    let backend = Arc::new(token.backend(2));

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                for _ in 0..3 {
                    if i % 2 == 0 {
                        backend.list_generators().unwrap();
                    } else {
                        backend
                            .generate_code_at("user001:issuer", OtpType::Totp, Some(30), 90)
                            .unwrap();
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(token.max_in_flight(), 1);
    assert_eq!(token.opens(), 1);
}

#[test]
fn test_communication_error_reopens_on_next_call() {
    init_logger();
    let token = FakeToken::with_generators(1);
    let backend = token.backend(10);

    backend.list_generators().unwrap();
    assert_eq!(token.opens(), 1);

    // Probe passes, the command itself breaks the pipe
    token.push_fault(Fault::Pass);
    token.push_fault(Fault::Io);
    let err = backend
        .generate_code_at("user000:issuer", OtpType::Totp, Some(30), 0)
        .unwrap_err();
    assert!(matches!(err, Error::Communication(_)));
    assert!(backend.executor().connected_endpoint().is_none());
    assert!(eventually(|| token.open_handles() == 0));
    assert!(backend.last_error().unwrap().starts_with("Communication error"));

    backend.list_generators().unwrap();
    assert_eq!(token.opens(), 2);
    assert_eq!(backend.last_error(), None);
}

#[test]
fn test_garbage_reply_invalidates_session() {
    init_logger();
    let token = FakeToken::with_generators(1);
    let backend = token.backend(10);

    backend.list_generators().unwrap();
    token.push_fault(Fault::Pass);
    token.push_fault(Fault::Garbage);

    let err = backend.list_generators().unwrap_err();
    assert!(matches!(err, Error::Communication(_)));
    assert!(backend.executor().connected_endpoint().is_none());
}

#[test]
fn test_undecodable_record_invalidates_session() {
    init_logger();
    let token = FakeToken::with_generators(1);
    token.insert(Stored {
        label: "odd:alg".into(),
        otp_type: 2,
        alg: 9,
        digits: 6,
        counter: 0,
        period: Some(30),
        secret: vec![5; 20],
    });
    let backend = token.backend(10);

    let err = backend.list_generators().unwrap_err();
    assert!(matches!(err, Error::Communication(_)));
    assert!(backend.executor().connected_endpoint().is_none());
    assert!(
        backend
            .last_error()
            .unwrap()
            .starts_with("Communication error")
    );
    assert!(eventually(|| token.open_handles() == 0));
}

#[test]
fn test_generate_reply_without_code_invalidates_session() {
    init_logger();
    let token = FakeToken::with_generators(1);
    let backend = token.backend(10);

    backend.list_generators().unwrap();
    token.push_fault(Fault::Pass);
    token.push_fault(Fault::Status(0x00));

    let err = backend
        .generate_code_at("user000:issuer", OtpType::Totp, Some(30), 60)
        .unwrap_err();
    assert!(matches!(err, Error::Communication(_)));
    assert!(backend.executor().connected_endpoint().is_none());
    assert_eq!(backend.last_error(), Some(err.to_string()));
}

#[test]
fn test_failed_probe_rediscovers_transparently() {
    init_logger();
    let token = FakeToken::with_generators(2);
    let backend = token.backend(10);

    backend.list_generators().unwrap();
    token.push_fault(Fault::Io);

    assert_eq!(backend.list_generators().unwrap().len(), 2);
    assert_eq!(token.opens(), 2);
    assert!(eventually(|| token.open_handles() == 1));
}

#[test]
fn test_protocol_error_keeps_session() {
    init_logger();
    let token = FakeToken::with_generators(1);
    let backend = token.backend(10);

    let err = backend
        .generate_code_at("missing", OtpType::Totp, Some(30), 0)
        .unwrap_err();
    assert_eq!(err.status_code(), Some(0xF5));
    assert_eq!(backend.last_error().as_deref(), Some("Generator not found"));

    backend.list_generators().unwrap();
    assert_eq!(token.opens(), 1);
    assert!(backend.executor().connected_endpoint().is_some());
}

#[test]
fn test_timeout_invalidates_session() {
    init_logger();
    let token = FakeToken::with_generators(1);
    let backend = token.backend(10);

    backend.list_generators().unwrap();

    token.push_fault(Fault::Pass);
    token.push_fault(Fault::Delay(Duration::from_millis(900)));

    let start = Instant::now();
    let err = backend
        .generate_code_at("user000:issuer", OtpType::Totp, Some(30), 0)
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err, Error::Timeout);
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(900));
    assert_eq!(backend.last_error().as_deref(), Some("Command timed out"));
    assert!(backend.executor().connected_endpoint().is_none());

    // A fresh handle is opened while the stuck call drains on its own
    backend.list_generators().unwrap();
    assert_eq!(token.opens(), 2);
}

#[test]
fn test_no_device_is_reported_as_communication_error() {
    init_logger();
    let token = FakeToken::new();
    token.set_present(false);
    let backend = token.backend(10);

    let err = backend.list_generators().unwrap_err();
    assert_eq!(err, Error::Communication("No OTP token detected".into()));
    assert_eq!(
        backend.last_error().as_deref(),
        Some("Communication error: No OTP token detected")
    );
    assert!(!backend.probe_presence());
}

#[test]
fn test_discovery_retries_configured_attempts() {
    init_logger();
    let token = FakeToken::new();
    token.set_present(false);

    let config = BackendConfig::builder()
        .command_timeout(Duration::from_millis(500))
        .discovery_attempts(3)
        .discovery_backoff(Duration::from_millis(10))
        .build();
    let backend = OtpBackend::with_enumerators(vec![token.enumerator()], config);

    let start = Instant::now();
    assert!(backend.list_generators().is_err());
    assert_eq!(token.enumerations(), 3);
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn test_enumeration_failure_moves_to_next_family() {
    init_logger();
    let broken = FakeToken::new();
    broken.set_enumeration_fails(true);
    let token = FakeToken::with_generators(1);

    let backend = OtpBackend::with_enumerators(
        vec![broken.enumerator(), token.enumerator()],
        test_config(10),
    );

    assert_eq!(backend.list_generators().unwrap().len(), 1);
    assert_eq!(broken.enumerations(), 1);
    assert_eq!(token.opens(), 1);
}

#[test]
fn test_discovery_skips_endpoints_without_otp() {
    init_logger();
    let plain = FakeToken::new();
    plain.set_otp_support(false);
    let token = FakeToken::with_generators(2);

    let backend = OtpBackend::with_enumerators(
        vec![plain.enumerator(), token.enumerator()],
        test_config(10),
    );

    assert_eq!(backend.list_generators().unwrap().len(), 2);
    assert_eq!(plain.opens(), 1);
    assert!(eventually(|| plain.open_handles() == 0));
    assert_eq!(token.open_handles(), 1);
}

#[test]
fn test_first_family_wins_when_both_have_tokens() {
    init_logger();
    let first = FakeToken::with_generators(1);
    let second = FakeToken::with_generators(5);

    let backend = OtpBackend::with_enumerators(
        vec![first.enumerator(), second.enumerator()],
        test_config(10),
    );

    assert_eq!(backend.list_generators().unwrap().len(), 1);
    assert_eq!(second.enumerations(), 0);
}

#[test]
fn test_token_unplugged_and_replugged() {
    init_logger();
    let token = FakeToken::with_generators(1);
    let backend = token.backend(10);

    assert!(backend.probe_presence());
    token.set_present(false);
    assert!(!backend.probe_presence());
    assert!(eventually(|| token.open_handles() == 0));

    token.set_present(true);
    assert!(backend.probe_presence());
    assert_eq!(token.opens(), 2);
}
