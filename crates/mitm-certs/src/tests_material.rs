#[test]
fn certificate_pem_round_trip_reproduces_certificate() {
    let ca = test_ca("material-pem.test");
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("ca.crt");
    ca.to_material()
        .save_certificate(&path, Encoding::Pem)
        .expect("save certificate");

    let mut loaded = KeyCertMaterial::default();
    loaded
        .load_certificate(&path, Encoding::Pem)
        .expect("load certificate");
    let loaded_cert = loaded.certificate().expect("loaded certificate");

    assert_eq!(
        loaded_cert.to_der().expect("der"),
        ca.certificate().to_der().expect("der")
    );
    assert_eq!(
        loaded_cert.signature().as_slice(),
        ca.certificate().signature().as_slice()
    );
    assert!(loaded_cert
        .verify(&ca.certificate().public_key().expect("public key"))
        .expect("verify"));
}

#[test]
fn certificate_der_round_trip_reproduces_certificate() {
    let ca = test_ca("material-der.test");
    let der = ca
        .to_material()
        .serialize_certificate(Encoding::Der)
        .expect("serialize der");
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("ca.der");
    fs::write(&path, &der).expect("write der");

    let mut loaded = KeyCertMaterial::default();
    loaded
        .load_certificate(&path, Encoding::Der)
        .expect("load der certificate");
    assert_eq!(
        loaded.certificate().expect("certificate").to_der().expect("der"),
        der
    );
}

#[test]
fn private_key_round_trip_without_passphrase() {
    let ca = test_ca("material-key.test");
    let dir = TempDir::new().expect("temp dir");

    for (encoding, file_name) in [(Encoding::Pem, "ca.key"), (Encoding::Der, "ca.key.der")] {
        let path = dir.path().join(file_name);
        ca.to_material()
            .save_private_key(&path, None, encoding)
            .expect("save key");

        let mut loaded = KeyCertMaterial::default();
        loaded
            .load_private_key(&path, None, encoding)
            .expect("load key");
        let key = loaded.private_key().expect("loaded key");
        assert!(key.public_eq(ca.private_key()), "{encoding:?}");
        assert_eq!(
            key.public_key_to_der().expect("public der"),
            ca.private_key().public_key_to_der().expect("public der")
        );
    }
}

#[test]
fn encrypted_pem_key_requires_matching_passphrase() {
    let ca = test_ca("material-encrypted.test");
    let pem = ca
        .to_material()
        .serialize_private_key(Some("correct horse"), Encoding::Pem)
        .expect("serialize encrypted key");
    assert!(String::from_utf8_lossy(&pem).contains("ENCRYPTED PRIVATE KEY"));

    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("ca.key");
    fs::write(&path, &pem).expect("write key");

    let mut loaded = KeyCertMaterial::default();
    loaded
        .load_private_key(&path, Some("correct horse"), Encoding::Pem)
        .expect("load with passphrase");
    assert!(loaded
        .private_key()
        .expect("key")
        .public_eq(ca.private_key()));

    let wrong = KeyCertMaterial::default()
        .load_private_key(&path, Some("battery staple"), Encoding::Pem)
        .expect_err("wrong passphrase must fail");
    assert!(matches!(wrong, CertError::Decryption(_)), "{wrong}");

    let missing = KeyCertMaterial::default()
        .load_private_key(&path, None, Encoding::Pem)
        .expect_err("missing passphrase must fail");
    assert!(matches!(missing, CertError::Decryption(_)), "{missing}");
}

#[test]
fn encrypted_der_key_round_trips_with_passphrase() {
    let ca = test_ca("material-encrypted-der.test");
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("ca.key.der");
    ca.to_material()
        .save_private_key(&path, Some("s3cret"), Encoding::Der)
        .expect("save encrypted der key");

    let mut loaded = KeyCertMaterial::default();
    loaded
        .load_private_key(&path, Some("s3cret"), Encoding::Der)
        .expect("load encrypted der key");
    assert!(loaded
        .private_key()
        .expect("key")
        .public_eq(ca.private_key()));

    let wrong = KeyCertMaterial::default()
        .load_private_key(&path, Some("not it"), Encoding::Der)
        .expect_err("wrong passphrase must fail");
    assert!(matches!(wrong, CertError::Decryption(_)), "{wrong}");

    let missing = KeyCertMaterial::default()
        .load_private_key(&path, None, Encoding::Der)
        .expect_err("missing passphrase must fail");
    assert!(matches!(missing, CertError::Decryption(_)), "{missing}");
}

#[test]
fn plain_der_key_is_not_mistaken_for_encrypted() {
    let ca = test_ca("material-plain-der.test");
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("pkcs8.der");
    fs::write(&path, ca.private_key().private_key_to_pkcs8().expect("pkcs8 der"))
        .expect("write key");

    let mut loaded = KeyCertMaterial::default();
    loaded
        .load_private_key(&path, None, Encoding::Der)
        .expect("load unencrypted pkcs8 der");
    assert!(loaded
        .private_key()
        .expect("key")
        .public_eq(ca.private_key()));

    fs::write(&path, b"\x30\x03\x02\x01\x00").expect("write truncated key");
    let error = KeyCertMaterial::default()
        .load_private_key(&path, None, Encoding::Der)
        .expect_err("not a key");
    assert!(matches!(error, CertError::Parse { .. }), "{error}");
}

#[test]
fn malformed_input_is_a_parse_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("garbage.pem");
    fs::write(&path, b"-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n")
        .expect("write garbage");

    let cert_error = KeyCertMaterial::default()
        .load_certificate(&path, Encoding::Pem)
        .expect_err("garbage certificate");
    assert!(matches!(cert_error, CertError::Parse { .. }), "{cert_error}");

    let der_error = KeyCertMaterial::default()
        .load_certificate(&path, Encoding::Der)
        .expect_err("garbage der certificate");
    assert!(matches!(der_error, CertError::Parse { .. }), "{der_error}");

    let key_error = KeyCertMaterial::default()
        .load_private_key(&path, None, Encoding::Pem)
        .expect_err("garbage key");
    assert!(matches!(key_error, CertError::Parse { .. }), "{key_error}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("absent.crt");

    let error = KeyCertMaterial::default()
        .load_certificate(&path, Encoding::Pem)
        .expect_err("missing file");
    assert!(matches!(error, CertError::Io { .. }), "{error}");
    assert!(error.to_string().contains("absent.crt"), "{error}");
}

#[test]
fn serializing_absent_parts_is_a_state_error() {
    let empty = KeyCertMaterial::default();
    assert!(matches!(
        empty.serialize_certificate(Encoding::Pem),
        Err(CertError::State("certificate"))
    ));
    assert!(matches!(
        empty.serialize_private_key(None, Encoding::Pem),
        Err(CertError::State("private key"))
    ));

    let ca = test_ca("material-state.test");
    let cert_only = KeyCertMaterial::new(None, Some(ca.certificate().clone()));
    assert!(matches!(
        cert_only.export_pkcs12("pw"),
        Err(CertError::State("private key"))
    ));
    let key_only = KeyCertMaterial::new(Some(ca.private_key().clone()), None);
    assert!(matches!(
        key_only.export_pkcs12("pw"),
        Err(CertError::State("certificate"))
    ));
}

#[test]
fn pkcs12_export_bundles_certificate_and_key() {
    let ca = test_ca("material-pkcs12.test");
    let leaf = issue_server_certificate(&ca, &LeafRequest::new(["p12.example"], Vec::<String>::new()))
        .expect("issue leaf");

    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("leaf.p12");
    leaf.save_pkcs12(&path, "bundle-pass").expect("save pkcs12");

    let der = fs::read(&path).expect("read pkcs12");
    let parsed = Pkcs12::from_der(&der)
        .expect("pkcs12 der")
        .parse2("bundle-pass")
        .expect("parse pkcs12");
    let bundled_cert = parsed.cert.expect("bundled certificate");
    let bundled_key = parsed.pkey.expect("bundled key");

    assert_eq!(
        bundled_cert.to_der().expect("der"),
        leaf_certificate(&leaf).to_der().expect("der")
    );
    assert!(bundled_key.public_eq(leaf.private_key().expect("leaf key")));
    assert!(Pkcs12::from_der(&der)
        .expect("pkcs12 der")
        .parse2("wrong-pass")
        .is_err());
}

#[test]
fn load_from_files_reads_encrypted_authority() {
    let ca = test_ca("material-files.test");
    let dir = TempDir::new().expect("temp dir");
    let cert_path = dir.path().join("ca.crt");
    let key_path = dir.path().join("ca.key");
    ca.save(&cert_path, &key_path, Some("ca-pass"))
        .expect("save CA");

    let material =
        KeyCertMaterial::load_from_files(&cert_path, &key_path, Some("ca-pass")).expect("load");
    let reloaded = CertificateAuthority::from_material(material).expect("authority");
    assert_eq!(
        reloaded.certificate_pem().expect("pem"),
        ca.certificate_pem().expect("pem")
    );

    let error = CertificateAuthority::load(&cert_path, &key_path, None)
        .expect_err("encrypted CA key without passphrase");
    assert!(matches!(error, CertError::Decryption(_)), "{error}");
}
