//! Config files drive cluster bootstrap.

use ordered_kv::config::{self, Config, ConfigLayer, merge_layers, write_config};
use ordered_kv::core::{ConfigError, Mode, ReplicaId};

fn cluster_config(id: u32) -> Config {
    Config {
        replica_id: ReplicaId::new(id),
        mode: Mode::Sequential,
        listen_addr: format!("127.0.0.1:{}", 7100 + id),
        peers: (0..3).map(|n| format!("127.0.0.1:{}", 7100 + n)).collect(),
        ..Config::default()
    }
}

#[test]
fn written_configs_load_into_consistent_memberships() {
    let dir = tempfile::tempdir().expect("tempdir");
    for id in 0..3 {
        write_config(&dir.path().join(format!("replica-{id}.toml")), &cluster_config(id))
            .expect("write");
    }
    for id in 0..3u32 {
        let layer = config::load_layer(&dir.path().join(format!("replica-{id}.toml")))
            .expect("read")
            .expect("present");
        let cfg = merge_layers([layer]);
        let membership = cfg.validate().expect("valid");
        assert_eq!(membership.local(), ReplicaId::new(id));
        assert_eq!(membership.size(), 3);
        assert_eq!(cfg.peers[id as usize], cfg.listen_addr);
    }
}

#[test]
fn flags_layer_over_file() {
    let file = ConfigLayer {
        replica_id: Some(ReplicaId::new(5)),
        peers: Some(vec!["a:1".into(), "b:1".into()]),
        ..ConfigLayer::default()
    };
    let cfg = merge_layers([file]);
    assert_eq!(
        cfg.validate().unwrap_err(),
        ConfigError::UnknownReplica {
            replica: ReplicaId::new(5),
            size: 2
        }
    );

    let fix = ConfigLayer {
        replica_id: Some(ReplicaId::new(1)),
        ..ConfigLayer::default()
    };
    let cfg = merge_layers([
        ConfigLayer {
            peers: Some(vec!["a:1".into(), "b:1".into()]),
            ..ConfigLayer::default()
        },
        fix,
    ]);
    assert_eq!(cfg.validate().expect("valid").local(), ReplicaId::new(1));
}
