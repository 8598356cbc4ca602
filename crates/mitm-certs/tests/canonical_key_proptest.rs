use mitm_certs::{HostIdentitySet, LeafRequest};
use proptest::prelude::*;

fn dns_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z0-9-]{1,12}(\\.[a-z0-9-]{1,12}){0,2}").expect("dns regex")
}

fn ip_strategy() -> impl Strategy<Value = String> {
    any::<[u8; 4]>().prop_map(|octets| std::net::Ipv4Addr::from(octets).to_string())
}

fn identities_strategy() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    (
        prop::collection::vec(dns_strategy(), 0..6),
        prop::collection::vec(ip_strategy(), 0..4),
    )
}

proptest! {
    #[test]
    fn canonical_key_ignores_input_order(
        (dns, ips) in identities_strategy(),
        seed in any::<u64>(),
    ) {
        let baseline = HostIdentitySet::new(dns.clone(), ips.clone()).canonical_key();

        let mut shuffled_dns = dns;
        let mut shuffled_ips = ips;
        if !shuffled_dns.is_empty() {
            let len = shuffled_dns.len();
            shuffled_dns.rotate_left(seed as usize % len);
            shuffled_dns.reverse();
        }
        if !shuffled_ips.is_empty() {
            let len = shuffled_ips.len();
            shuffled_ips.rotate_left((seed >> 32) as usize % len);
        }

        let reordered = HostIdentitySet::new(shuffled_dns, shuffled_ips).canonical_key();
        prop_assert_eq!(baseline, reordered);
    }

    #[test]
    fn canonical_key_ignores_dns_ip_grouping(
        (dns, ips) in identities_strategy(),
        split in 0usize..10,
    ) {
        let baseline = HostIdentitySet::new(dns.clone(), ips.clone()).canonical_key();

        let mut all: Vec<String> = dns.into_iter().chain(ips).collect();
        let split = split.min(all.len());
        let tail = all.split_off(split);
        let regrouped = HostIdentitySet::new(tail, all).canonical_key();

        prop_assert_eq!(baseline, regrouped);
    }

    #[test]
    fn canonical_key_is_sorted_and_complete((dns, ips) in identities_strategy()) {
        let key = HostIdentitySet::new(dns.clone(), ips.clone()).canonical_key();
        let names = key.names();

        prop_assert_eq!(names.len(), dns.len() + ips.len());
        prop_assert!(names.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn generated_names_yield_dns_then_ip_alt_names((dns, ips) in identities_strategy()) {
        let request = LeafRequest::new(dns.clone(), ips.clone());
        let alt_names = request.subject_alt_names().expect("valid alt names");
        let rendered: Vec<String> = alt_names.iter().map(ToString::to_string).collect();

        let expected: Vec<String> = dns
            .iter()
            .map(|name| format!("DNS:{name}"))
            .chain(ips.iter().map(|ip| format!("IP:{ip}")))
            .collect();
        prop_assert_eq!(rendered, expected);
    }
}
