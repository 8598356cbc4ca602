use std::fmt;

/// The DNS names and IP literals a leaf certificate is requested for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentitySet {
    dns_names: Vec<String>,
    ip_addrs: Vec<String>,
}

impl HostIdentitySet {
    pub fn new<D, I>(dns_names: D, ip_addrs: I) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            dns_names: dns_names.into_iter().map(Into::into).collect(),
            ip_addrs: ip_addrs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    pub fn ip_addrs(&self) -> &[String] {
        &self.ip_addrs
    }

    pub fn is_empty(&self) -> bool {
        self.dns_names.is_empty() && self.ip_addrs.is_empty()
    }

    /// Sorts DNS names and IP literals together as one sequence.
    ///
    /// Which list an identity arrived in does not matter: `(["b"], ["a"])` and
    /// `(["a", "b"], [])` produce the same key.
    pub fn canonical_key(&self) -> CanonicalKey {
        let mut names: Vec<String> = self
            .dns_names
            .iter()
            .chain(self.ip_addrs.iter())
            .cloned()
            .collect();
        names.sort();
        CanonicalKey(names)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(Vec<String>);

impl CanonicalKey {
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}
