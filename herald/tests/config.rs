#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;

use herald::Herald;
use herald_delivery::ProviderConfig;
use herald_store::StoreConfig;
use pretty_assertions::assert_eq;

const SAMPLE: &str = include_str!("../../herald.config.ron");

#[test]
fn sample_config_parses() {
    let herald = Herald::parse(SAMPLE).unwrap();

    assert_eq!(
        herald.store,
        StoreConfig::File {
            path: PathBuf::from("./herald-data")
        }
    );
    assert_eq!(herald.processor.workers, 4);
    assert_eq!(herald.processor.retry.base_delay_ms, 60_000);

    let sender = herald.sender.as_ref().unwrap();
    assert_eq!(sender.mailbox(), "Example Bookings <noreply@example.com>");

    assert_eq!(herald.providers.len(), 2);
    match &herald.providers[0] {
        ProviderConfig::Smtp(smtp) => {
            assert_eq!(smtp.host, "smtp.example.com");
            assert_eq!(smtp.port, Some(587));
            assert_eq!(smtp.username.as_deref(), Some("herald"));
        }
        other => panic!("expected smtp first, got {other:?}"),
    }
    assert!(matches!(herald.providers[1], ProviderConfig::Log));

    let names: Vec<_> = herald.templates.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["email_verification", "email_verification_reminder"]);
    assert!(herald.templates[0].html.as_deref().unwrap().contains("{{PinCode}}"));
    assert_eq!(herald.templates[1].html, None);

    assert_eq!(herald.health.listen_address, "127.0.0.1:8081");
    assert!(herald.audit.redact_recipients);
}

// Building the SMTP transport needs a runtime
#[tokio::test]
async fn sample_config_passes_check() {
    Herald::parse(SAMPLE).unwrap().check().unwrap();
}

#[test]
fn explicit_options_still_parse() {
    let herald = Herald::parse(
        r#"(
            store: Memory(capacity: Some(100)),
            sender: Some((from: "ops@example.com")),
            providers: [SendGrid(api_key: "SG.key")],
        )"#,
    )
    .unwrap();

    assert_eq!(herald.store, StoreConfig::Memory { capacity: Some(100) });
    assert_eq!(herald.sender.unwrap().from, "ops@example.com");
    assert!(matches!(&herald.providers[0], ProviderConfig::SendGrid(c) if c.api_key == "SG.key"));
}

#[test]
fn load_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("herald.config.ron");
    std::fs::write(&path, "(processor: (workers: \"many\"))").unwrap();

    let err = Herald::load(&path).unwrap_err();
    assert!(err.to_string().contains("herald.config.ron"), "{err}");

    let err = Herald::load(&dir.path().join("absent.ron")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config"), "{err}");
}
