fn test_pool(dir: &TempDir) -> CertificatePool {
    CertificatePool::new(dir.path(), test_ca("pool.test"))
}

fn leaf_serial(path: &Path) -> String {
    let chain = X509::stack_from_pem(&fs::read(path).expect("read chain")).expect("parse chain");
    chain[0]
        .serial_number()
        .to_bn()
        .expect("serial")
        .to_dec_str()
        .expect("dec")
        .to_string()
}

#[test]
fn repeated_lookup_reuses_issued_certificate() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);

    let first = pool
        .certificate_for_host(["api.example.com"], ["10.1.2.3"], None)
        .expect("first lookup");
    let first_bytes = fs::read(&first.0).expect("read cert");
    let second = pool
        .certificate_for_host(["api.example.com"], ["10.1.2.3"], None)
        .expect("second lookup");

    assert_eq!(first, second);
    assert_eq!(fs::read(&second.0).expect("read cert"), first_bytes);
    assert_eq!(leaf_serial(&first.0), leaf_serial(&second.0));
    assert_eq!(
        pool.metrics_snapshot(),
        PoolMetricsSnapshot {
            cache_hits: 1,
            cache_misses: 1,
            leaves_issued: 1,
        }
    );
    assert_eq!(pool.len().expect("len"), 1);
}

#[test]
fn lookup_reports_cache_status() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);
    let identities = HostIdentitySet::new(["status.example"], Vec::<String>::new());

    let miss = pool.lookup(&identities, None).expect("first lookup");
    let hit = pool.lookup(&identities, None).expect("second lookup");

    assert_eq!(miss.cache_status, LeafCacheStatus::Miss);
    assert_eq!(hit.cache_status, LeafCacheStatus::Hit);
    assert_eq!(miss.record, hit.record);
    assert_eq!(hit.record.key.names(), ["status.example"]);
    assert_eq!(hit.cache_status.as_str(), "hit");
}

#[test]
fn identity_order_and_grouping_do_not_change_pool_entry() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);

    let baseline = pool
        .certificate_for_host(["a.example", "b.example"], ["10.0.0.1"], None)
        .expect("baseline");
    let reordered = pool
        .certificate_for_host(["b.example", "a.example"], ["10.0.0.1"], None)
        .expect("reordered");
    let regrouped = pool
        .certificate_for_host(["10.0.0.1", "a.example"], ["b.example"], None)
        .expect("regrouped");

    assert_eq!(baseline, reordered);
    assert_eq!(baseline, regrouped);
    assert_eq!(pool.metrics_snapshot().leaves_issued, 1);
}

#[test]
fn common_name_is_not_part_of_pool_key() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);

    let default_cn = pool
        .certificate_for_host(["cn.example"], Vec::<String>::new(), None)
        .expect("default common name");
    let custom_cn = pool
        .certificate_for_host(["cn.example"], Vec::<String>::new(), Some("other"))
        .expect("custom common name");

    assert_eq!(default_cn, custom_cn);
    let chain = X509::stack_from_pem(&fs::read(&custom_cn.0).expect("read")).expect("parse");
    assert_eq!(subject_common_name(&chain[0]).as_deref(), Some("bla"));
}

#[test]
fn first_request_common_name_is_used_for_issuance() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir).with_default_common_name("pool-default");

    let named = pool
        .certificate_for_host(["named.example"], Vec::<String>::new(), Some("named.example"))
        .expect("named");
    let defaulted = pool
        .certificate_for_host(["unnamed.example"], Vec::<String>::new(), None)
        .expect("defaulted");

    let named_chain = X509::stack_from_pem(&fs::read(&named.0).expect("read")).expect("parse");
    let defaulted_chain =
        X509::stack_from_pem(&fs::read(&defaulted.0).expect("read")).expect("parse");
    assert_eq!(
        subject_common_name(&named_chain[0]).as_deref(),
        Some("named.example")
    );
    assert_eq!(
        subject_common_name(&defaulted_chain[0]).as_deref(),
        Some("pool-default")
    );
}

#[test]
fn distinct_identity_sets_get_distinct_files() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);
    let identities = [
        HostIdentitySet::new(["one.example"], Vec::<String>::new()),
        HostIdentitySet::new(["two.example"], Vec::<String>::new()),
        HostIdentitySet::new(Vec::<String>::new(), ["192.0.2.1"]),
    ];

    let mut expected_files = Vec::new();
    let mut ids = HashSet::new();
    for identity in &identities {
        let pooled = pool.lookup(identity, None).expect("lookup");
        let record = pooled.record;
        assert_eq!(record.cert_id.len(), 32);
        assert!(record.cert_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(record.cert_path, dir.path().join(format!("{}.crt", record.cert_id)));
        assert_eq!(record.key_path, dir.path().join(format!("{}.key", record.cert_id)));
        expected_files.push(format!("{}.crt", record.cert_id));
        expected_files.push(format!("{}.key", record.cert_id));
        assert!(ids.insert(record.cert_id));
    }
    expected_files.sort();

    assert_eq!(dir_entries(dir.path()), expected_files);
    assert_eq!(pool.len().expect("len"), 3);
}

#[test]
fn pooled_certificate_file_holds_leaf_then_ca() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);
    let (cert_path, key_path) = pool
        .certificate_for_host(["chain.example"], ["::1"], None)
        .expect("lookup");

    let chain = X509::stack_from_pem(&fs::read(&cert_path).expect("read")).expect("parse");
    assert_eq!(chain.len(), 2);
    let ca = pool.certificate_authority();
    assert_eq!(
        chain[1].to_der().expect("der"),
        ca.certificate().to_der().expect("der")
    );
    assert!(issuer_matches_subject(&chain[0], ca.certificate()));
    assert_eq!(san_entries(&chain[0]), vec!["DNS:chain.example", "IP:::1"]);

    let mut key = KeyCertMaterial::default();
    key.load_private_key(&key_path, None, Encoding::Pem)
        .expect("load key");
    assert!(chain[0]
        .public_key()
        .expect("public key")
        .public_eq(key.private_key().expect("key")));
}

#[test]
fn concurrent_requests_issue_once() {
    let dir = TempDir::new().expect("temp dir");
    let pool = Arc::new(test_pool(&dir));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.certificate_for_host(["race.example"], ["10.9.9.9"], None)
                    .expect("concurrent lookup")
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect();

    assert!(results.iter().all(|paths| *paths == results[0]));
    let snapshot = pool.metrics_snapshot();
    assert_eq!(snapshot.leaves_issued, 1);
    assert_eq!(snapshot.cache_misses, 1);
    assert_eq!(snapshot.cache_hits, threads as u64 - 1);
    assert_eq!(dir_entries(dir.path()).len(), 2);
}

#[test]
fn empty_identity_set_is_rejected_without_side_effects() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);

    let error = pool
        .certificate_for_host(Vec::<String>::new(), Vec::<String>::new(), Some("foo"))
        .expect_err("empty identities");
    assert!(matches!(error, CertError::Validation(_)), "{error}");
    assert!(pool.is_empty().expect("is_empty"));
    assert_eq!(pool.metrics_snapshot().leaves_issued, 0);
    assert!(dir_entries(dir.path()).is_empty());

    pool.certificate_for_host(["after.example"], Vec::<String>::new(), None)
        .expect("pool still usable");
}

#[test]
fn pools_do_not_share_state() {
    let first_dir = TempDir::new().expect("temp dir");
    let second_dir = TempDir::new().expect("temp dir");
    let ca = test_ca("shared.test");
    let first = CertificatePool::new(first_dir.path(), ca.clone());
    let second = CertificatePool::new(second_dir.path(), ca);

    let a = first
        .certificate_for_host(["shared.example"], Vec::<String>::new(), None)
        .expect("first pool");
    let b = second
        .certificate_for_host(["shared.example"], Vec::<String>::new(), None)
        .expect("second pool");

    assert_ne!(a, b);
    assert!(a.0.starts_with(first_dir.path()));
    assert!(b.0.starts_with(second_dir.path()));
    assert_eq!(first.metrics_snapshot().leaves_issued, 1);
    assert_eq!(second.metrics_snapshot().leaves_issued, 1);
}

#[test]
fn from_config_generates_then_reloads_authority() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = PoolConfig::new(dir.path().join("leaves"));
    config.ca_cert_path = Some(dir.path().join("ca").join("rootCA.crt"));
    config.ca_key_path = Some(dir.path().join("ca").join("rootCA.key"));
    config.ca_key_passphrase = Some("ca-pass".to_string());
    config.ca_common_name = "config.test".to_string();

    let generated = CertificatePool::from_config(&config).expect("generate CA");
    let reloaded = CertificatePool::from_config(&config).expect("reload CA");

    assert_eq!(
        generated.ca_certificate_pem().expect("pem"),
        reloaded.ca_certificate_pem().expect("pem")
    );
    assert_eq!(
        subject_common_name(reloaded.certificate_authority().certificate()).as_deref(),
        Some("config.test")
    );
    let key_pem = fs::read_to_string(dir.path().join("ca").join("rootCA.key")).expect("read key");
    assert!(key_pem.contains("ENCRYPTED PRIVATE KEY"));

    let (cert_path, _) = reloaded
        .certificate_for_host(["config.example"], Vec::<String>::new(), None)
        .expect("lookup");
    assert!(cert_path.starts_with(dir.path().join("leaves")));
    assert_eq!(leaf_serial(&cert_path), DEFAULT_LEAF_SERIAL.to_string());
}

#[test]
fn from_config_rejects_partial_authority_configuration() {
    let dir = TempDir::new().expect("temp dir");

    let mut partial = PoolConfig::new(dir.path());
    partial.ca_cert_path = Some(dir.path().join("rootCA.crt"));
    let error = CertificatePool::from_config(&partial)
        .err()
        .expect("partial paths");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");

    let cert_path = dir.path().join("only.crt");
    fs::write(&cert_path, b"placeholder").expect("write placeholder");
    let mut half_present = PoolConfig::new(dir.path());
    half_present.ca_cert_path = Some(cert_path);
    half_present.ca_key_path = Some(dir.path().join("missing.key"));
    let error = CertificatePool::from_config(&half_present)
        .err()
        .expect("one CA file missing");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");

    let error = CertificatePool::from_config(&PoolConfig::default())
        .err()
        .expect("empty base dir");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");
}

#[test]
fn from_config_without_authority_paths_uses_ephemeral_ca() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = PoolConfig::new(dir.path());
    config.leaf_serial = 31337;

    let pool = CertificatePool::from_config(&config).expect("ephemeral CA");
    let (cert_path, _) = pool
        .certificate_for_host(["ephemeral.example"], Vec::<String>::new(), None)
        .expect("lookup");
    assert_eq!(leaf_serial(&cert_path), "31337");
    assert_eq!(dir_entries(dir.path()).len(), 2);
}

#[test]
fn pool_config_reads_json_with_defaults() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("pool.json");
    fs::write(
        &path,
        r#"{ "base_dir": "/var/lib/mitm/leaves", "default_common_name": "proxy" }"#,
    )
    .expect("write config");

    let config = PoolConfig::from_json_file(&path).expect("parse config");
    assert_eq!(config.base_dir, Path::new("/var/lib/mitm/leaves"));
    assert_eq!(config.default_common_name, "proxy");
    assert_eq!(config.ca_common_name, DEFAULT_CA_COMMON_NAME);
    assert_eq!(config.ca_serial, DEFAULT_CA_SERIAL);
    assert_eq!(config.leaf_serial, DEFAULT_LEAF_SERIAL);
    assert_eq!(config.ca_cert_path, None);

    fs::write(&path, r#"{ "base_dir": "/tmp", "ca_key_passphrase": "" }"#).expect("write config");
    let error = PoolConfig::from_json_file(&path).expect_err("empty passphrase");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");

    fs::write(&path, b"{ not json").expect("write config");
    let error = PoolConfig::from_json_file(&path).expect_err("malformed json");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");
}

#[test]
fn server_config_presents_pooled_chain() {
    let dir = TempDir::new().expect("temp dir");
    let pool = test_pool(&dir);
    let identities = HostIdentitySet::new(["tls.example"], ["127.0.0.1"]);

    let config = pool
        .server_config_for_host(&identities, None)
        .expect("server config");
    assert!(config.alpn_protocols.is_empty());
    assert_eq!(pool.metrics_snapshot().leaves_issued, 1);

    pool.server_config_for_host(&identities, None)
        .expect("cached server config");
    assert_eq!(pool.metrics_snapshot().leaves_issued, 1);
    assert_eq!(pool.metrics_snapshot().cache_hits, 1);
}

#[test]
fn concurrent_mixed_requests_issue_once_per_identity_set() {
    let dir = TempDir::new().expect("temp dir");
    let pool = Arc::new(test_pool(&dir));
    let requests: Vec<(usize, Vec<&'static str>, Vec<&'static str>)> = vec![
        (0, vec!["a.example", "b.example"], vec!["10.0.0.1"]),
        (0, vec!["b.example", "a.example"], vec!["10.0.0.1"]),
        (0, vec!["10.0.0.1", "a.example"], vec!["b.example"]),
        (1, vec!["c.example"], vec![]),
        (1, vec!["c.example"], vec![]),
        (2, vec![], vec!["192.0.2.7", "192.0.2.8"]),
        (2, vec![], vec!["192.0.2.8", "192.0.2.7"]),
        (3, vec!["a.example"], vec![]),
        (0, vec!["a.example", "b.example"], vec!["10.0.0.1"]),
        (3, vec!["a.example"], vec![]),
    ];
    let distinct_sets = 4;
    let barrier = Arc::new(Barrier::new(requests.len()));

    let handles: Vec<_> = requests
        .into_iter()
        .map(|(group, dns, ips)| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let paths = pool
                    .certificate_for_host(dns, ips, None)
                    .expect("concurrent lookup");
                (group, paths)
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect();

    let mut paths_by_group = HashMap::new();
    for (group, paths) in &results {
        let expected = paths_by_group.entry(*group).or_insert_with(|| paths.clone());
        assert_eq!(expected, paths, "identity set {group} resolved to different files");
    }
    let unique_paths: HashSet<_> = paths_by_group.values().collect();
    assert_eq!(unique_paths.len(), distinct_sets);

    let snapshot = pool.metrics_snapshot();
    assert_eq!(snapshot.leaves_issued, distinct_sets as u64);
    assert_eq!(snapshot.cache_misses, distinct_sets as u64);
    assert_eq!(
        snapshot.cache_hits,
        (results.len() - distinct_sets) as u64
    );
    assert_eq!(pool.len().expect("len"), distinct_sets);
    assert_eq!(dir_entries(dir.path()).len(), 2 * distinct_sets);
}
