const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn test_ca(common_name: &str) -> CertificateAuthority {
    generate_root_ca(common_name, 0x12345).expect("generate root CA")
}

fn parsed<R>(certificate: &X509, inspect: impl FnOnce(&X509Certificate<'_>) -> R) -> R {
    let der = certificate.to_der().expect("certificate der");
    let (_, cert) = parse_x509_certificate(&der).expect("parse x509");
    inspect(&cert)
}

fn san_entries(certificate: &X509) -> Vec<String> {
    parsed(certificate, |cert| {
        let Some(san) = cert.subject_alternative_name().expect("san extension parse") else {
            return Vec::new();
        };
        san.value
            .general_names
            .iter()
            .map(|name| match name {
                GeneralName::DNSName(dns) => format!("DNS:{dns}"),
                GeneralName::IPAddress(bytes) => format!("IP:{}", ip_from_bytes(bytes)),
                other => panic!("unexpected general name {other:?}"),
            })
            .collect()
    })
}

fn ip_from_bytes(bytes: &[u8]) -> IpAddr {
    match bytes.len() {
        4 => IpAddr::from(<[u8; 4]>::try_from(bytes).expect("ipv4 bytes")),
        16 => IpAddr::from(<[u8; 16]>::try_from(bytes).expect("ipv6 bytes")),
        len => panic!("unexpected IP length {len}"),
    }
}

fn subject_common_name(certificate: &X509) -> Option<String> {
    parsed(certificate, |cert| {
        cert.subject()
            .iter_common_name()
            .next()
            .map(|cn| cn.as_str().expect("commonName as utf8").to_string())
    })
}

fn subject_organization(certificate: &X509) -> String {
    parsed(certificate, |cert| {
        cert.subject()
            .iter_organization()
            .next()
            .expect("organization")
            .as_str()
            .expect("organization as utf8")
            .to_string()
    })
}

fn subject_country(certificate: &X509) -> String {
    parsed(certificate, |cert| {
        cert.subject()
            .iter_country()
            .next()
            .expect("country")
            .as_str()
            .expect("country as utf8")
            .to_string()
    })
}

fn validity_bounds(certificate: &X509) -> (i64, i64) {
    parsed(certificate, |cert| {
        (
            cert.validity().not_before.timestamp(),
            cert.validity().not_after.timestamp(),
        )
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_secs() as i64
}

fn assert_days_from_now(timestamp: i64, days: i64) {
    let expected = unix_now() + days * SECONDS_PER_DAY;
    assert!(
        (timestamp - expected).abs() < 2 * 60 * 60,
        "timestamp {timestamp} is not {days} days from now"
    );
}

fn issuer_matches_subject(leaf: &X509, issuer: &X509) -> bool {
    leaf.issuer_name().to_der().expect("issuer der")
        == issuer.subject_name().to_der().expect("subject der")
}

fn leaf_certificate(material: &KeyCertMaterial) -> &X509 {
    material.certificate().expect("leaf certificate")
}

fn dir_entries(path: &Path) -> Vec<String> {
    let mut entries: Vec<String> = fs::read_dir(path)
        .expect("read dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .to_string()
        })
        .collect();
    entries.sort();
    entries
}
