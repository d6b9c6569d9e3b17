use std::time::Duration;

use pretty_assertions::assert_eq;
use tbft_roles::validator::{BlockVersion, Round, ValidatorId};
use tbft_storage::{WalEntry, WalWriteMode};

use crate::ChainConfig;

#[test]
fn missing_fields_take_defaults() {
    let cfg = ChainConfig::from_json(r#"{"validators": ["b", "a", "c"]}"#).unwrap();
    assert_eq!(
        cfg,
        ChainConfig {
            validators: vec!["b".into(), "a".into(), "c".into()],
            ..ChainConfig::default()
        }
    );
    let set = cfg.validator_set().unwrap();
    let ids: Vec<_> = set.iter().cloned().collect();
    assert_eq!(
        ids,
        vec![ValidatorId::from("a"), ValidatorId::from("b"), ValidatorId::from("c")]
    );
}

#[test]
fn full_config() {
    let json = r#"{
        "validators": ["a", "b", "c", "d"],
        "blocks_per_proposer": 3,
        "timeout_propose": 2000,
        "timeout_propose_delta": 100,
        "timeout_prevote": 500,
        "timeout_prevote_delta": 50,
        "timeout_precommit": 600,
        "timeout_precommit_delta": 60,
        "timeout_commit": 10,
        "timeout_propose_optimal": 300,
        "wal_mode": "async",
        "proposer_v2_block_version": 7
    }"#;
    let cfg = ChainConfig::from_json(json).unwrap();
    assert_eq!(cfg.wal_mode, WalWriteMode::Async);
    let set = cfg.validator_set().unwrap();
    assert_eq!(set.blocks_per_proposer(), 3);

    let t = cfg.timeouts();
    assert_eq!(t.propose(Round(0)), Duration::from_millis(2000));
    assert_eq!(t.propose(Round(3)), Duration::from_millis(2300));
    assert_eq!(t.prevote(Round(2)), Duration::from_millis(600));
    assert_eq!(t.precommit(Round(1)), Duration::from_millis(660));
    assert_eq!(t.commit, Duration::from_millis(10));
    assert_eq!(t.propose_optimal, Some(Duration::from_millis(300)));

    // Proposer rotation switches at the configured block version.
    let prev = ValidatorId::from("c");
    let h = tbft_roles::validator::Height(3);
    assert_eq!(
        set.get_proposer(BlockVersion(7), &prev, h, Round(0)).unwrap(),
        &ValidatorId::from("d")
    );
}

#[test]
fn invalid_configs_are_rejected() {
    for json in [
        r#"{}"#,
        r#"{"validators": ["a", "a"]}"#,
        r#"{"validators": ["a"], "blocks_per_proposer": 0}"#,
        r#"{"validators": ["a"], "timeout_propose": 0}"#,
        r#"{"validators": ["a"], "timeout_propose": 100, "timeout_propose_optimal": 100}"#,
        r#"{"validators": ["a"], "wal_mode": "sometimes"}"#,
        r#"not json"#,
    ] {
        assert!(ChainConfig::from_json(json).is_err(), "accepted {json}");
    }
}

#[test]
fn open_wal_follows_the_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal");
    let mut cfg = ChainConfig {
        validators: vec!["a".into()],
        ..ChainConfig::default()
    };

    let mut wal = cfg.open_wal(&path).unwrap();
    assert_eq!(wal.mode(), WalWriteMode::Sync);
    let entry = WalEntry::Checkpoint {
        height: tbft_roles::validator::Height(3),
    };
    wal.append(&entry).unwrap();
    drop(wal);
    let mut wal = cfg.open_wal(&path).unwrap();
    assert_eq!(wal.replay().unwrap(), vec![entry]);

    cfg.wal_mode = WalWriteMode::Disabled;
    let mut wal = cfg.open_wal(&dir.path().join("other")).unwrap();
    assert_eq!(wal.mode(), WalWriteMode::Disabled);
    assert!(wal.replay().unwrap().is_empty());
    assert!(!dir.path().join("other").exists());
}
