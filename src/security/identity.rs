//! Identity derivation.
//!
//! Admission state is keyed by `user:<id>` when an upstream authentication
//! layer attached an [`AuthenticatedUser`], otherwise by `ip:<address>`.
//! IPv4-mapped IPv6 peers are keyed by their IPv4 form.

use std::fmt;
use std::net::IpAddr;

/// Attached to request extensions by the authentication layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
}

impl AuthenticatedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// The key under which request counts and suspicion are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    User(String),
    Ip(IpAddr),
}

impl Identity {
    pub fn resolve(user: Option<&AuthenticatedUser>, ip: IpAddr) -> Self {
        match user {
            Some(user) => Identity::User(user.id.clone()),
            None => Identity::Ip(ip.to_canonical()),
        }
    }

    /// Canonical store key.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user:{id}"),
            Identity::Ip(ip) => write!(f, "ip:{ip}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_takes_precedence_over_address() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        let user = AuthenticatedUser::new("42");

        assert_eq!(Identity::resolve(Some(&user), ip).key(), "user:42");
        assert_eq!(Identity::resolve(None, ip).key(), "ip:10.0.0.7");
    }

    #[test]
    fn test_mapped_address_shares_ipv4_key() {
        let mapped: IpAddr = "::ffff:1.2.3.4".parse().unwrap();
        let plain: IpAddr = "1.2.3.4".parse().unwrap();
        assert_eq!(Identity::resolve(None, mapped), Identity::resolve(None, plain));
        assert_eq!(Identity::resolve(None, mapped).key(), "ip:1.2.3.4");
    }

    #[test]
    fn test_ipv6_key() {
        let ip: IpAddr = "::1".parse().unwrap();
        assert_eq!(Identity::Ip(ip).key(), "ip:::1");
    }
}
