//! Integration tests using only the public API

use gasless_transfer::relay::RelayInstruction;
use gasless_transfer::{
    parse_ui_amount, Config, KeypairWallet, NoProgress, Pubkey, TransferAsset, TransferError,
    TransferPipeline, TransferRequest, WalletSession, WalletSigner,
};
use solana_sdk::signature::{Keypair, Signer};
use std::io::Write;
use std::sync::Arc;

#[test]
fn test_config_file_with_partial_sections() {
    let mut file = tempfile::NamedTempFile::new().expect("Should create temp file");
    writeln!(
        file,
        r#"
[relay]
url = "https://relay.example.com/"

[compute_budget]
unit_price_micro_lamports = 5000
"#
    )
    .expect("Should write config");

    let config = Config::from_file(file.path().to_str().expect("Should be utf-8"))
        .expect("Should load config");

    assert_eq!(config.relay.url, "https://relay.example.com/");
    assert_eq!(config.compute_budget.unit_price_micro_lamports, 5000);
    assert_eq!(config.compute_budget.unit_limit, 200_000);
    assert_eq!(config.network.rpc_url, Config::default().network.rpc_url);
}

#[test]
fn test_invalid_config_is_refused_by_pipeline() {
    let mut config = Config::default();
    config.relay.url = "  ".to_string();

    assert!(TransferPipeline::from_config(&config).is_err());
}

#[test]
fn test_ui_amounts() {
    assert_eq!(parse_ui_amount("2.5", 6).expect("Should parse"), 2_500_000);
    assert_eq!(parse_ui_amount("1", 9).expect("Should parse"), 1_000_000_000);
    assert!(matches!(
        parse_ui_amount("0.0000001", 6),
        Err(TransferError::InvalidInput(_))
    ));
    assert!(parse_ui_amount("0", 6).is_err());
    assert!(parse_ui_amount("-1", 6).is_err());
}

#[test]
fn test_relay_instruction_from_buffer_json() {
    let program = Pubkey::new_unique();
    let authority = Pubkey::new_unique();
    let json = format!(
        r#"{{
            "programAddress": "{}",
            "accounts": [{{ "address": "{}", "role": 2 }}],
            "data": {{ "type": "Buffer", "data": [3, 16, 39, 0, 0, 0, 0, 0, 0] }}
        }}"#,
        program, authority
    );

    let relay_ix: RelayInstruction = serde_json::from_str(&json).expect("Should deserialize");
    let ix = relay_ix.to_instruction().expect("Should convert");

    assert_eq!(ix.program_id, program);
    assert!(ix.accounts[0].is_signer);
    assert!(!ix.accounts[0].is_writable);
    assert_eq!(ix.data, vec![3, 16, 39, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn test_wallet_session_lifecycle() {
    let keypair = Keypair::new();
    let expected = keypair.pubkey();
    let wallet = Arc::new(KeypairWallet::from_keypair(keypair));

    let mut session = WalletSession::new();
    assert!(!session.is_connected());
    assert_eq!(session.connect(wallet.clone()), expected);
    assert_eq!(session.pubkey(), Some(wallet.pubkey()));

    session.disconnect();
    assert_eq!(session.pubkey(), None);
}

#[tokio::test]
async fn test_invalid_recipient_fails_without_network() {
    let mut config = Config::default();
    // Nothing listens here; validation must fail first
    config.network.rpc_url = "http://127.0.0.1:9".to_string();
    config.relay.url = "http://127.0.0.1:9".to_string();
    let pipeline = TransferPipeline::from_config(&config).expect("Should build pipeline");

    let wallet = Arc::new(KeypairWallet::from_keypair(Keypair::new()));
    let session = WalletSession::connected(wallet.clone());
    let request = TransferRequest::new(wallet.pubkey(), "0xdeadbeef", 1, TransferAsset::Native);

    let err = pipeline
        .execute_transfer(&request, &session, &NoProgress)
        .await
        .expect_err("Should reject recipient");

    assert!(matches!(err, TransferError::InvalidInput(_)));
    assert!(!err.is_retryable());
}
