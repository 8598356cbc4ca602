#[test]
fn resign_moves_certificate_under_new_authority() {
    let original_ca = test_ca("resign-original.test");
    let new_ca = test_ca("resign-new.test");
    let request = LeafRequest::new(["resign.example"], ["192.0.2.10"])
        .with_common_name("resign.example")
        .with_serial(77);
    let mut leaf = issue_server_certificate(&original_ca, &request).expect("issue leaf");
    let before = leaf_certificate(&leaf).clone();

    resign(&new_ca.to_material(), &mut leaf).expect("re-sign");
    let after = leaf_certificate(&leaf);

    assert!(issuer_matches_subject(after, new_ca.certificate()));
    assert!(after
        .verify(&new_ca.certificate().public_key().expect("public key"))
        .expect("verify"));
    assert!(!after
        .verify(&original_ca.certificate().public_key().expect("public key"))
        .expect("verify"));
    assert_ne!(after.signature().as_slice(), before.signature().as_slice());

    assert_eq!(
        after.subject_name().to_der().expect("subject der"),
        before.subject_name().to_der().expect("subject der")
    );
    assert_eq!(san_entries(after), san_entries(&before));
    assert_eq!(validity_bounds(after), validity_bounds(&before));
    assert_eq!(
        after.serial_number().to_bn().expect("serial").to_dec_str().expect("dec").to_string(),
        "77"
    );
    assert!(after
        .public_key()
        .expect("public key")
        .public_eq(&before.public_key().expect("public key")));
    assert!(leaf
        .private_key()
        .expect("key survives")
        .public_eq(&after.public_key().expect("public key")));
}

#[test]
fn resign_preserves_extension_criticality() {
    let original_ca = test_ca("resign-ext-original.test");
    let new_ca = test_ca("resign-ext-new.test");
    let mut leaf = issue_server_certificate(
        &original_ca,
        &LeafRequest::new(["ext.example"], Vec::<String>::new()),
    )
    .expect("issue leaf");

    let summarize = |cert: &X509| {
        parsed(cert, |parsed| {
            parsed
                .extensions()
                .iter()
                .map(|extension| {
                    (
                        extension.oid.to_id_string(),
                        extension.critical,
                        extension.value.to_vec(),
                    )
                })
                .collect::<Vec<_>>()
        })
    };
    let before = summarize(leaf_certificate(&leaf));

    resign(&new_ca.to_material(), &mut leaf).expect("re-sign");

    assert_eq!(summarize(leaf_certificate(&leaf)), before);
}

#[test]
fn resign_requires_target_certificate_and_ca_key() {
    let ca = test_ca("resign-state.test");

    let mut no_certificate = KeyCertMaterial::new(Some(ca.private_key().clone()), None);
    let error = resign(&ca.to_material(), &mut no_certificate).expect_err("missing target cert");
    assert!(matches!(error, CertError::State(_)), "{error}");

    let keyless_ca = KeyCertMaterial::new(None, Some(ca.certificate().clone()));
    let mut leaf = issue_server_certificate(&ca, &LeafRequest::new(["state.example"], Vec::<String>::new()))
        .expect("issue leaf");
    let original_der = leaf_certificate(&leaf).to_der().expect("der");
    let error = resign(&keyless_ca, &mut leaf).expect_err("missing CA key");
    assert!(matches!(error, CertError::State("CA private key")), "{error}");
    assert_eq!(leaf_certificate(&leaf).to_der().expect("der"), original_der);
}
