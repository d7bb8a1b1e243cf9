//! Integration tests for feed loading, enumeration and reloads.

use exitlist::{
    AddressPort, EngineConfig, Error, FeedFetch, FeedSource, FileSource, LoadMode, Loader,
    PolicySet, ReloadManager, Result, Strategy,
};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

const STRATEGIES: [Strategy; 2] = [Strategy::Scan, Strategy::Index];

/// Ports accepted by a typical "reduced exit policy" relay.
const REDUCED_PORTS: &[(u16, u16)] = &[
    (20, 23),
    (43, 43),
    (53, 53),
    (79, 81),
    (88, 88),
    (110, 110),
    (143, 143),
    (194, 194),
    (220, 220),
    (443, 443),
    (464, 465),
    (543, 544),
    (563, 563),
    (587, 587),
    (706, 706),
    (749, 749),
    (873, 873),
    (902, 904),
    (981, 981),
    (989, 995),
    (1194, 1194),
    (1220, 1220),
    (1293, 1293),
    (1500, 1500),
    (1723, 1723),
    (1863, 1863),
    (2082, 2083),
    (2086, 2087),
    (2095, 2096),
    (3128, 3128),
    (3389, 3389),
    (3690, 3690),
    (4321, 4321),
    (4643, 4643),
    (5050, 5050),
    (5190, 5190),
    (5222, 5223),
    (5228, 5228),
    (5900, 5900),
    (6666, 6667),
    (6679, 6679),
    (6697, 6697),
    (8000, 8000),
    (8008, 8008),
    (8080, 8080),
    (8087, 8088),
    (8443, 8443),
    (8888, 8888),
    (9418, 9418),
    (9999, 10000),
    (19294, 19294),
    (19638, 19638),
];

fn wildcard_rules(accept: bool, ports: &[(u16, u16)]) -> String {
    ports
        .iter()
        .map(|(min, max)| {
            format!(
                r#"{{"IsAccept": {}, "MinPort": {}, "MaxPort": {}, "Address": null, "IsAddressWildcard": true}}"#,
                accept, min, max
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn relay(fingerprint: &str, address: &str, default_allow: bool, rules: &str) -> String {
    format!(
        r#"{{"Rules": [{}], "IsAllowedDefault": {}, "Address": ["{}"], "Fingerprint": "{}"}}"#,
        rules, default_allow, address, fingerprint
    )
}

fn load(feed: &str, strategy: Strategy) -> PolicySet {
    Loader::new(EngineConfig::default().with_strategy(strategy))
        .load(feed.as_bytes(), LoadMode::Full)
        .unwrap()
}

/// Addresses a text dump would list, ignoring order.
fn dumped(set: &PolicySet, ip: &str, port: u16) -> BTreeSet<String> {
    let mut out = Vec::new();
    set.dump(&mut out, &AddressPort::new(ip, port), 16).unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn set_of(addrs: &[&str]) -> BTreeSet<String> {
    addrs.iter().map(|a| a.to_string()).collect()
}

#[test]
fn test_exit_list_loading() {
    let feed = [
        relay(
            "1",
            "83.227.52.198",
            false,
            &wildcard_rules(true, &[(706, 706), (993, 993), (995, 995)]),
        ),
        relay("2", "91.121.43.80", false, &wildcard_rules(true, REDUCED_PORTS)),
    ]
    .join("\n");

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);

        assert_eq!(set.is_tor("91.121.43.80"), Some("2"));
        assert_eq!(set.is_tor("91.121.43.4"), None);
        assert_eq!(set.is_tor("83.227.52.198"), None);

        assert_eq!(
            dumped(&set, "38.229.70.31", 995),
            set_of(&["91.121.43.80", "83.227.52.198"])
        );
    }
}

#[test]
fn test_two_relays_without_https() {
    let reduced_no_https: Vec<(u16, u16)> = REDUCED_PORTS
        .iter()
        .copied()
        .filter(|&(min, _)| min != 443)
        .collect();
    let feed = [
        relay("A", "83.227.52.198", false, &wildcard_rules(true, &[(995, 995)])),
        relay("B", "91.121.43.80", false, &wildcard_rules(true, &reduced_no_https)),
    ]
    .join("\n");

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);
        assert_eq!(
            dumped(&set, "38.229.70.31", 995),
            set_of(&["91.121.43.80", "83.227.52.198"])
        );
        assert!(dumped(&set, "38.229.70.31", 443).is_empty());
        assert_eq!(set.canonical_len(), 0);
    }
}

#[test]
fn test_is_accept_rules() {
    let feed = [
        relay("1", "111.111.111.111", false, &wildcard_rules(false, &[(706, 706), (5000, 55000)])),
        relay("2", "222.222.222.222", false, &wildcard_rules(true, &[(706, 706), (5000, 55000)])),
    ]
    .join("\n");

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);
        assert_eq!(dumped(&set, "38.229.70.31", 706), set_of(&["222.222.222.222"]));
        assert_eq!(dumped(&set, "38.229.70.31", 50000), set_of(&["222.222.222.222"]));
    }
}

#[test]
fn test_default_allowed_policy() {
    let feed = [
        relay("1", "111.111.111.111", true, &wildcard_rules(false, &[(706, 706), (5000, 55000)])),
        relay("2", "222.222.222.222", false, &wildcard_rules(true, &[(706, 706), (5000, 55000)])),
    ]
    .join("\n");

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);
        assert_eq!(dumped(&set, "38.229.70.31", 200), set_of(&["111.111.111.111"]));
        assert_eq!(dumped(&set, "38.229.70.31", 706), set_of(&["222.222.222.222"]));
        assert_eq!(dumped(&set, "38.229.70.31", 50000), set_of(&["222.222.222.222"]));
    }
}

#[test]
fn test_rules_non_wildcard() {
    let exact = |accept: bool| {
        format!(
            r#"{{"IsAccept": {a}, "MinPort": 706, "MaxPort": 706, "Address": "38.229.70.31"}}, {{"IsAccept": {a}, "MinPort": 5000, "MaxPort": 55000, "Address": "38.229.70.31"}}"#,
            a = accept
        )
    };
    let feed = [
        relay("1", "111.111.111.111", true, &exact(false)),
        relay("2", "222.222.222.222", false, &exact(true)),
    ]
    .join("\n");

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);
        assert_eq!(dumped(&set, "38.229.70.31", 706), set_of(&["222.222.222.222"]));
        assert_eq!(dumped(&set, "38.229.70.31", 53000), set_of(&["222.222.222.222"]));
        assert_eq!(dumped(&set, "32.32.32.32", 706), set_of(&["111.111.111.111"]));
        assert_eq!(dumped(&set, "32.32.32.32", 53000), set_of(&["111.111.111.111"]));
    }
}

#[test]
fn test_masked_ip() {
    let feed = relay(
        "1",
        "111.111.111.111",
        true,
        r#"{"MaxPort": 65535, "IsAddressWildcard": false, "Mask": "255.0.0.0", "Address": "0.0.0.0", "IsAccept": false, "MinPort": 1}, {"MaxPort": 65535, "IsAddressWildcard": false, "Mask": "255.255.0.0", "Address": "169.254.0.0", "IsAccept": false, "MinPort": 1}"#,
    );

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);
        assert!(dumped(&set, "0.1.2.3", 123).is_empty());
        assert!(dumped(&set, "169.254.111.111", 345).is_empty());
        assert_eq!(dumped(&set, "1.1.2.3", 123), set_of(&["111.111.111.111"]));
    }
}

#[test]
fn test_double_reject() {
    let feed = relay(
        "1",
        "111.111.111.111",
        true,
        r#"{"IsAccept": false, "MinPort": 80, "MaxPort": 80, "Address": "222.222.222.222"}, {"IsAccept": false, "MinPort": 80, "MaxPort": 80, "Address": "123.123.123.123"}"#,
    );

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);
        assert!(dumped(&set, "222.222.222.222", 80).is_empty());
        assert_eq!(dumped(&set, "222.222.222.111", 80), set_of(&["111.111.111.111"]));
    }
}

#[test]
fn test_reject_with_default_reject() {
    let feed = relay(
        "1",
        "111.111.111.111",
        false,
        r#"{"IsAccept": false, "MinPort": 80, "MaxPort": 80, "Address": "222.222.222.222"}, {"IsAccept": true, "MinPort": 80, "MaxPort": 80, "Address": "", "IsAddressWildcard": true}"#,
    );

    for strategy in STRATEGIES {
        let set = load(&feed, strategy);
        assert!(dumped(&set, "222.222.222.222", 80).is_empty());
        assert_eq!(dumped(&set, "222.222.222.111", 80), set_of(&["111.111.111.111"]));
        assert!(dumped(&set, "222.222.222.111", 81).is_empty());
    }
}

#[test]
fn test_matched_rule_ordering() {
    let reject_first = relay(
        "1",
        "111.111.111.111",
        false,
        r#"{"IsAccept": false, "MinPort": 80, "MaxPort": 80, "Address": "222.222.222.222"}, {"IsAccept": true, "MinPort": 80, "MaxPort": 80, "Address": "222.222.222.222"}"#,
    );
    let accept_first = relay(
        "1",
        "111.111.111.111",
        false,
        r#"{"IsAccept": true, "MinPort": 80, "MaxPort": 80, "Address": "222.222.222.222"}, {"IsAccept": false, "MinPort": 80, "MaxPort": 80, "Address": "222.222.222.222"}"#,
    );

    for strategy in STRATEGIES {
        assert!(dumped(&load(&reject_first, strategy), "222.222.222.222", 80).is_empty());
        assert_eq!(
            dumped(&load(&accept_first, strategy), "222.222.222.222", 80),
            set_of(&["111.111.111.111"])
        );
    }
}

#[test]
fn test_past_hours() {
    let feed = concat!(
        r#"{"Rules": [{"IsAccept": true, "MinPort": 80, "MaxPort": 80, "Address": null, "IsAddressWildcard": true}], "IsAllowedDefault": false, "Address": ["111.111.111.111"], "Fingerprint": "1", "Tminus": 4}"#,
        "\n",
        r#"{"Rules": [{"IsAccept": true, "MinPort": 80, "MaxPort": 80, "Address": null, "IsAddressWildcard": true}], "IsAllowedDefault": false, "Address": ["222.222.222.222"], "Fingerprint": "2", "Tminus": 17}"#
    );

    for strategy in STRATEGIES {
        let set = load(feed, strategy);
        assert_eq!(dumped(&set, "123.123.123.123", 80), set_of(&["111.111.111.111"]));
        // Too old to list, still a valid exit
        assert!(set.can_exit(&AddressPort::new("123.123.123.123", 80)));
        assert_eq!(set.get("2").map(|p| p.freshness_age()), Some(17));
    }
}

#[test]
fn test_empty_feed_classifies_nothing() {
    for strategy in STRATEGIES {
        let set = load("", strategy);
        assert!(set.is_empty());
        assert_eq!(set.is_tor("91.121.43.80"), None);
        assert!(dumped(&set, "38.229.70.31", 443).is_empty());
    }
}

#[test]
fn test_load_from_file_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exit-policies");
    fs::write(
        &path,
        relay("2", "91.121.43.80", false, &wildcard_rules(true, REDUCED_PORTS)),
    )
    .unwrap();

    let manager = ReloadManager::start(Loader::default(), Box::new(FileSource::new(&path))).unwrap();
    assert_eq!(manager.current().is_tor("91.121.43.80"), Some("2"));

    // Relay 2 drops out, relay 3 appears.
    fs::write(
        &path,
        relay("3", "93.93.93.93", true, &wildcard_rules(false, &[(25, 25)])),
    )
    .unwrap();
    assert!(manager.reload().unwrap());

    let set = manager.current();
    assert_eq!(set.len(), 2);
    assert_eq!(set.get("2").unwrap().freshness_age(), 1);
    assert_eq!(set.is_tor("91.121.43.80"), Some("2"));
    assert_eq!(set.is_tor("93.93.93.93"), Some("3"));
    drop(set);

    // A broken feed keeps the previous snapshot.
    fs::write(&path, r#"{"Fingerprint": "4", "Address": ["not-an-ip"]}"#).unwrap();
    assert!(matches!(manager.reload(), Err(Error::MalformedRecord { .. })));
    assert_eq!(manager.current().len(), 2);
    assert_eq!(manager.generation(), 1);
}

/// Serves a fixed list of feeds, one per fetch.
struct Feeds(Vec<String>);

impl FeedSource for Feeds {
    fn fetch(&mut self) -> Result<FeedFetch> {
        if self.0.is_empty() {
            return Ok(FeedFetch::NotModified);
        }
        Ok(FeedFetch::Data(self.0.remove(0).into_bytes()))
    }

    fn describe(&self) -> String {
        "feeds".to_string()
    }
}

#[test]
fn test_incremental_reload_cycle() {
    let a = relay("A", "1.1.1.1", false, &wildcard_rules(true, &[(443, 443)]));
    let b = relay("B", "2.2.2.2", false, &wildcard_rules(true, &[(443, 443)]));
    let a_moved = relay("A", "1.1.1.9", false, &wildcard_rules(true, &[(443, 443)]));

    let feeds = Feeds(vec![
        format!("{}\n{}", a, b),
        b.clone(),
        format!("{}\n{}", a_moved, b),
    ]);
    let manager = Arc::new(ReloadManager::start(Loader::default(), Box::new(feeds)).unwrap());

    // N+1: A missing, carried forward with its address.
    assert!(manager.reload().unwrap());
    let snapshot = manager.snapshot();
    let carried = snapshot.get("A").unwrap();
    assert_eq!(carried.freshness_age(), 1);
    assert_eq!(snapshot.is_tor("1.1.1.1"), Some("A"));

    // N+2: A is back under a new address; age resets, addresses accumulate.
    assert!(manager.reload().unwrap());
    let current = manager.current();
    let back = current.get("A").unwrap();
    assert_eq!(back.freshness_age(), 0);
    assert_eq!(back.addresses().len(), 2);
    assert_eq!(current.is_tor("1.1.1.9"), Some("A"));
    assert_eq!(current.is_tor("1.1.1.1"), Some("A"));

    // Feed exhausted: the source reports no change and nothing ages.
    assert!(!manager.reload().unwrap());
    assert_eq!(manager.current().get("B").unwrap().freshness_age(), 0);
    assert_eq!(manager.generation(), 2);

    // Snapshots taken earlier are unaffected.
    assert_eq!(snapshot.get("A").unwrap().freshness_age(), 1);
}

#[test]
fn test_strategies_agree_on_generated_feed() {
    let mut records = Vec::new();
    for i in 0..60u16 {
        let rules = match i % 5 {
            0 => wildcard_rules(true, &REDUCED_PORTS[..(i as usize % 20) + 1]),
            1 => format!(
                r#"{{"IsAccept": false, "MinPort": 1, "MaxPort": 65535, "Address": "10.0.0.0", "Mask": "255.0.0.0"}}, {}"#,
                wildcard_rules(true, &[(80, 80), (443, 443)])
            ),
            2 => wildcard_rules(false, &[(25, 25), (i, i + 100)]),
            3 => format!(
                r#"{{"IsAccept": true, "MinPort": {}, "MaxPort": 65535, "Address": "38.229.70.31"}}"#,
                i * 100
            ),
            _ => String::new(),
        };
        let address = format!("100.64.{}.{}", i / 8, i);
        records.push(relay(&format!("R{}", i), &address, i % 2 == 0, &rules));
    }
    let feed = records.join("\n");

    let scan = load(&feed, Strategy::Scan);
    let index = load(&feed, Strategy::Index);

    for ip in ["38.229.70.31", "10.1.2.3", "8.8.8.8", "2001:db8::1"] {
        for port in [0, 1, 22, 25, 53, 80, 443, 995, 1000, 5000, 6000, 19638, 65535] {
            let target = AddressPort::new(ip, port);
            assert_eq!(
                scan.enumerate(&target, 16),
                index.enumerate(&target, 16),
                "{}",
                target
            );
        }
    }
    assert_eq!(scan.canonical_len(), index.canonical_len());
}
