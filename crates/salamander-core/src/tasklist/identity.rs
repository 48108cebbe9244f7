use nix::unistd::{geteuid, getuid};
use salamander_protocol::{IntegrityLevel, PrivilegeClass};
use sha2::{Digest, Sha256};

/// Who this process is, as recorded in its table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub pid: u32,
    pub privilege: PrivilegeClass,
}

impl Identity {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            privilege: current_privilege(),
        }
    }

    /// Whether `other` may be commanded by this process.
    pub fn same_class(&self, other: &PrivilegeClass) -> bool {
        self.privilege == *other
    }
}

/// Privilege class of the running process: the real user plus elevation.
pub fn current_privilege() -> PrivilegeClass {
    let uid = getuid().as_raw();
    let integrity_level = if geteuid().is_root() {
        IntegrityLevel::High
    } else {
        IntegrityLevel::Medium
    };
    PrivilegeClass {
        sid_hash: sid_hash(uid),
        integrity_level,
    }
}

fn sid_hash(uid: u32) -> String {
    let digest = Sha256::digest(format!("uid:{uid}").as_bytes());
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sid_hash_is_stable_16_bytes() {
        let a = sid_hash(1000);
        assert_eq!(a.len(), 32);
        assert_eq!(a, sid_hash(1000));
        assert_ne!(a, sid_hash(1001));
    }

    #[test]
    fn test_current_identity() {
        let me = Identity::current();
        assert_eq!(me.pid, std::process::id());
        assert!(me.same_class(&current_privilege()));

        let elevated = PrivilegeClass {
            integrity_level: IntegrityLevel::System,
            ..me.privilege.clone()
        };
        assert!(!me.same_class(&elevated));
    }
}
