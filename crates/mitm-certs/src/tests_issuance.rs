#[test]
fn root_ca_is_self_signed_v3_authority() {
    let ca = test_ca("issuance-root.test");
    let cert = ca.certificate();

    assert_eq!(cert.version(), 2);
    assert!(issuer_matches_subject(cert, cert));
    assert!(cert
        .verify(&cert.public_key().expect("public key"))
        .expect("verify"));
    assert_eq!(ca.private_key().bits(), 2048);
    assert_eq!(
        cert.serial_number()
            .to_bn()
            .expect("serial bn")
            .to_dec_str()
            .expect("serial dec")
            .to_string(),
        0x12345.to_string()
    );

    assert_eq!(subject_country(cert), "US");
    assert!(subject_organization(cert).starts_with("mitm-certs-"));
    assert_eq!(
        subject_common_name(cert).as_deref(),
        Some("issuance-root.test")
    );
    assert!(cert.subject_key_id().is_some());

    parsed(cert, |parsed| {
        let constraints = parsed
            .basic_constraints()
            .expect("basic constraints parse")
            .expect("basic constraints present");
        assert!(constraints.critical);
        assert!(constraints.value.ca);

        let key_usage = parsed
            .key_usage()
            .expect("key usage parse")
            .expect("key usage present");
        assert!(key_usage.critical);
        assert!(key_usage.value.digital_signature());
        assert!(key_usage.value.key_cert_sign());
        assert!(!key_usage.value.key_encipherment());
    });

    let (not_before, not_after) = validity_bounds(cert);
    assert_days_from_now(not_before, -60);
    assert_days_from_now(not_after, 10 * 365);
}

#[test]
fn root_cas_with_same_common_name_get_distinct_subjects() {
    let first = test_ca("same-name.test");
    let second = test_ca("same-name.test");
    assert_ne!(
        subject_organization(first.certificate()),
        subject_organization(second.certificate())
    );
}

#[test]
fn root_ca_requires_common_name() {
    let error = generate_root_ca("  ", 1).expect_err("blank common name");
    assert!(matches!(error, CertError::Validation(_)), "{error}");
}

#[test]
fn generate_root_ca_files_writes_loadable_pem_pair() {
    let dir = TempDir::new().expect("temp dir");
    let cert_path = dir.path().join("rootCA.crt");
    let key_path = dir.path().join("rootCA.key");
    let ca = generate_root_ca_files(&cert_path, &key_path, 0x12345, "b2b-demo-CA")
        .expect("bootstrap CA");

    let loaded = CertificateAuthority::load(&cert_path, &key_path, None).expect("load CA");
    assert_eq!(
        loaded.certificate().to_der().expect("der"),
        ca.certificate().to_der().expect("der")
    );
    assert!(loaded.private_key().public_eq(ca.private_key()));
}

#[test]
fn authority_rejects_mismatched_or_non_ca_material() {
    let ca = test_ca("authority-check.test");
    let other = test_ca("authority-other.test");

    let mismatched =
        KeyCertMaterial::new(Some(other.private_key().clone()), Some(ca.certificate().clone()));
    let error = CertificateAuthority::from_material(mismatched).expect_err("mismatched key");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");

    let leaf = issue_server_certificate(&ca, &LeafRequest::new(["leaf.test"], Vec::<String>::new()))
        .expect("leaf");
    let error = CertificateAuthority::from_material(leaf).expect_err("leaf is not a CA");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");

    let error = CertificateAuthority::from_material(KeyCertMaterial::new(
        None,
        Some(ca.certificate().clone()),
    ))
    .expect_err("missing key");
    assert!(matches!(error, CertError::State("CA private key")), "{error}");
}

#[test]
fn server_certificate_lists_dns_then_ip_alt_names_in_order() {
    let ca = test_ca("issuance-san.test");
    let request = LeafRequest::new(["a.example", "b.example"], ["10.0.0.1"]);
    let leaf = issue_server_certificate(&ca, &request).expect("issue leaf");

    assert_eq!(
        san_entries(leaf_certificate(&leaf)),
        vec!["DNS:a.example", "DNS:b.example", "IP:10.0.0.1"]
    );
}

#[test]
fn server_certificate_alt_names_keep_caller_order_within_each_kind() {
    let ca = test_ca("issuance-order.test");
    let request = LeafRequest::new(
        ["zeta.example", "*.alpha.example"],
        ["2001:db8::1", "192.168.1.9"],
    );
    let leaf = issue_server_certificate(&ca, &request).expect("issue leaf");

    assert_eq!(
        san_entries(leaf_certificate(&leaf)),
        vec![
            "DNS:zeta.example",
            "DNS:*.alpha.example",
            "IP:2001:db8::1",
            "IP:192.168.1.9",
        ]
    );
}

#[test]
fn server_certificate_chains_to_issuing_ca() {
    let ca = test_ca("issuance-chain.test");
    let leaf = issue_server_certificate(
        &ca,
        &LeafRequest::new(["chain.example"], Vec::<String>::new()),
    )
    .expect("issue leaf");
    let cert = leaf_certificate(&leaf);

    assert!(cert
        .verify(&ca.certificate().public_key().expect("CA public key"))
        .expect("verify"));
    assert!(issuer_matches_subject(cert, ca.certificate()));
    assert_eq!(
        cert.authority_key_id().expect("authority key id").as_slice(),
        ca.certificate()
            .subject_key_id()
            .expect("CA subject key id")
            .as_slice()
    );

    let unrelated = test_ca("issuance-unrelated.test");
    assert!(!cert
        .verify(&unrelated.certificate().public_key().expect("public key"))
        .expect("verify"));
}

#[test]
fn server_certificate_carries_leaf_profile_extensions() {
    let ca = test_ca("issuance-profile.test");
    let request = LeafRequest::new(["profile.example"], Vec::<String>::new())
        .with_common_name("profile.example")
        .with_serial(4242);
    let leaf = issue_server_certificate(&ca, &request).expect("issue leaf");
    let cert = leaf_certificate(&leaf);
    let key = leaf.private_key().expect("leaf key");

    assert_eq!(key.bits(), 2048);
    assert!(!key.public_eq(ca.private_key()));
    assert!(cert.public_key().expect("public key").public_eq(key));
    assert!(cert.subject_key_id().is_some());
    assert_eq!(subject_country(cert), "US");
    assert_eq!(subject_organization(cert), "Server");
    assert_eq!(subject_common_name(cert).as_deref(), Some("profile.example"));
    assert_eq!(
        cert.serial_number()
            .to_bn()
            .expect("serial")
            .to_dec_str()
            .expect("dec")
            .to_string(),
        "4242"
    );

    parsed(cert, |parsed| {
        let constraints = parsed
            .basic_constraints()
            .expect("basic constraints parse")
            .expect("basic constraints present");
        assert!(constraints.critical);
        assert!(!constraints.value.ca);

        let key_usage = parsed
            .key_usage()
            .expect("key usage parse")
            .expect("key usage present");
        assert!(key_usage.critical);
        assert!(key_usage.value.digital_signature());
        assert!(key_usage.value.key_encipherment());
        assert!(!key_usage.value.key_cert_sign());

        let extended = parsed
            .extended_key_usage()
            .expect("extended key usage parse")
            .expect("extended key usage present");
        assert!(extended.value.server_auth);
        assert!(extended.value.client_auth);
    });

    let (not_before, not_after) = validity_bounds(cert);
    assert_days_from_now(not_before, -30);
    assert_days_from_now(not_after, 10 * 365);
}

#[test]
fn server_certificate_without_names_is_rejected() {
    let ca = test_ca("issuance-precondition.test");
    let request = LeafRequest::new(Vec::<String>::new(), Vec::<String>::new()).with_common_name("foo");

    let error = issue_server_certificate(&ca, &request).expect_err("no names");
    assert!(matches!(error, CertError::Validation(_)), "{error}");
}

#[test]
fn malformed_alt_names_are_rejected() {
    let ca = test_ca("issuance-malformed.test");

    let bad_ip = LeafRequest::new(["ok.example"], ["10.0.0.300"]);
    let error = issue_server_certificate(&ca, &bad_ip).expect_err("bad ip");
    assert!(matches!(error, CertError::Validation(_)), "{error}");

    let smuggled = LeafRequest::new(["a.example,IP:1.2.3.4"], Vec::<String>::new());
    let error = issue_server_certificate(&ca, &smuggled).expect_err("separator in dns name");
    assert!(matches!(error, CertError::Validation(_)), "{error}");
}

#[test]
fn client_certificate_may_rely_on_common_name_only() {
    let ca = test_ca("issuance-client.test");
    let request =
        LeafRequest::new(Vec::<String>::new(), Vec::<String>::new()).with_common_name("client-7");
    let leaf = issue_client_certificate(&ca, &request).expect("issue client certificate");
    let cert = leaf_certificate(&leaf);

    assert_eq!(subject_common_name(cert).as_deref(), Some("client-7"));
    assert!(san_entries(cert).is_empty());
    assert!(cert
        .verify(&ca.certificate().public_key().expect("public key"))
        .expect("verify"));
}

#[test]
fn leaf_without_common_name_has_no_cn_attribute() {
    let ca = test_ca("issuance-no-cn.test");
    let leaf = issue_server_certificate(&ca, &LeafRequest::new(["nocn.example"], Vec::<String>::new()))
        .expect("issue leaf");
    assert_eq!(subject_common_name(leaf_certificate(&leaf)), None);
}

#[test]
fn write_leaf_appends_ca_certificate_when_requested() {
    let ca = test_ca("issuance-write.test");
    let leaf = issue_server_certificate(&ca, &LeafRequest::new(["write.example"], ["127.0.0.1"]))
        .expect("issue leaf");
    let dir = TempDir::new().expect("temp dir");
    let chained = dir.path().join("chained.crt");
    let bare = dir.path().join("nested").join("bare.crt");
    let key = dir.path().join("leaf.key");

    write_leaf(
        &ca,
        &leaf,
        &LeafOutput {
            cert_path: Some(chained.clone()),
            key_path: Some(key.clone()),
            include_ca: true,
        },
    )
    .expect("write chained leaf");
    write_leaf(
        &ca,
        &leaf,
        &LeafOutput {
            cert_path: Some(bare.clone()),
            key_path: None,
            include_ca: false,
        },
    )
    .expect("write bare leaf");

    let chain = X509::stack_from_pem(&fs::read(&chained).expect("read chain")).expect("parse chain");
    assert_eq!(chain.len(), 2);
    assert_eq!(
        chain[0].to_der().expect("der"),
        leaf_certificate(&leaf).to_der().expect("der")
    );
    assert_eq!(
        chain[1].to_der().expect("der"),
        ca.certificate().to_der().expect("der")
    );

    let single = X509::stack_from_pem(&fs::read(&bare).expect("read bare")).expect("parse bare");
    assert_eq!(single.len(), 1);

    let mut reloaded = KeyCertMaterial::default();
    reloaded
        .load_private_key(&key, None, Encoding::Pem)
        .expect("load leaf key");
    assert!(reloaded
        .private_key()
        .expect("key")
        .public_eq(leaf.private_key().expect("leaf key")));
}

#[test]
fn authority_rejects_certificate_issued_by_another_ca() {
    let root = test_ca("authority-root.test");
    let mut intermediate = test_ca("authority-intermediate.test").into_material();
    resign(&root.to_material(), &mut intermediate).expect("re-sign under root");

    let error = CertificateAuthority::from_material(intermediate).expect_err("not self-issued");
    assert!(matches!(error, CertError::InvalidConfiguration(_)), "{error}");
    assert!(error.to_string().contains("self-issued"), "{error}");
}

#[test]
fn validity_window_rejects_clock_before_epoch() {
    let error = crate::params::validity_window_at(UNIX_EPOCH - Duration::from_secs(1), 30)
        .err().expect("pre-epoch clock");
    assert!(matches!(error, CertError::Clock(_)), "{error}");

    let (not_before, not_after) =
        crate::params::validity_window_at(UNIX_EPOCH + Duration::from_secs(100 * 86_400), 30)
            .expect("window");
    let span = not_before.diff(&not_after).expect("diff");
    assert_eq!((span.days, span.secs), (30 + 10 * 365, 0));
}

#[test]
fn write_leaf_leaves_nothing_behind_when_key_cannot_be_written() {
    let ca = test_ca("issuance-write-fail.test");
    let leaf = issue_server_certificate(&ca, &LeafRequest::new(["fail.example"], Vec::<String>::new()))
        .expect("issue leaf");
    let dir = TempDir::new().expect("temp dir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker");

    let error = write_leaf(
        &ca,
        &leaf,
        &LeafOutput {
            cert_path: Some(dir.path().join("leaf.crt")),
            key_path: Some(blocker.join("leaf.key")),
            include_ca: true,
        },
    )
    .expect_err("key directory is a file");

    assert!(matches!(error, CertError::Io { .. }), "{error}");
    assert_eq!(dir_entries(dir.path()), vec!["blocker"]);
}
