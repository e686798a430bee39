use super::types::Resource;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Host-specific archive of a tool release, e.g. `x86_64-linux-gnu`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavour {
    pub host: String,
    pub resource: Resource,
}

// Raspberry PI, BBB or other ARM based host use "arm-linux-gnueabihf",
// Arch-linux on PI2 uses "armv7l-unknown-linux-gnueabihf".
static ARM_LINUX: Lazy<Regex> = Lazy::new(|| pattern("arm.*-linux-gnueabihf"));
static ARM64_LINUX: Lazy<Regex> = Lazy::new(|| pattern("(aarch64|arm64)-linux-gnu"));
static AMD64_LINUX: Lazy<Regex> = Lazy::new(|| pattern("x86_64-.*linux-gnu"));
static I386_LINUX: Lazy<Regex> = Lazy::new(|| pattern("i[3456]86-.*linux-gnu"));
static I386_WINDOWS: Lazy<Regex> = Lazy::new(|| pattern("i[3456]86-.*(mingw32|cygwin)"));
static AMD64_WINDOWS: Lazy<Regex> = Lazy::new(|| pattern("(amd64|x86_64)-.*(mingw32|cygwin)"));
static AMD64_DARWIN: Lazy<Regex> = Lazy::new(|| pattern("x86_64-apple-darwin.*"));
static I386_DARWIN: Lazy<Regex> = Lazy::new(|| pattern("i[3456]86-apple-darwin.*"));
static ARM64_DARWIN: Lazy<Regex> = Lazy::new(|| pattern("arm64-apple-darwin.*"));
static ARM_FREEBSD: Lazy<Regex> = Lazy::new(|| pattern("arm.*-freebsd[0-9]*"));
static AMD64_FREEBSD: Lazy<Regex> = Lazy::new(|| pattern("(amd64|x86_64)-freebsd[0-9]*"));
static I386_FREEBSD: Lazy<Regex> = Lazy::new(|| pattern("i[3456]86-freebsd[0-9]*"));

fn pattern(expr: &str) -> Regex {
    // Anchored so "x86_64-linux-gnu" does not match a "x86_64-linux-gnux32" host.
    Regex::new(&format!("^{}$", expr)).expect("static host pattern")
}

/// How well a flavour fits a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HostMatch {
    /// Runs on the host (e.g. 32-bit build on a 64-bit host, or "all").
    Compatible,
    /// Built for exactly this host.
    Exact,
}

/// Operating system and CPU architecture of a machine, in `std::env::consts` terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Host {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Host {
    /// Detect the running machine
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }

    pub fn new(os: &'static str, arch: &'static str) -> Self {
        Self { os, arch }
    }

    /// Rate a flavour host string against this machine; `None` if it cannot run here.
    pub fn matches(&self, flavour_host: &str) -> Option<HostMatch> {
        if flavour_host == "all" || flavour_host == "any" {
            return Some(HostMatch::Compatible);
        }
        let exact = |re: &Regex| re.is_match(flavour_host).then_some(HostMatch::Exact);
        let compatible = |re: &Regex| re.is_match(flavour_host).then_some(HostMatch::Compatible);

        match (self.os, self.arch) {
            ("linux", "arm") => exact(&ARM_LINUX),
            ("linux", "aarch64") => exact(&ARM64_LINUX),
            ("linux", "x86_64") => exact(&AMD64_LINUX),
            ("linux", "x86") => exact(&I386_LINUX),
            ("windows", "x86_64") | ("windows", "aarch64") => {
                exact(&AMD64_WINDOWS).or_else(|| compatible(&I386_WINDOWS))
            }
            ("windows", _) => exact(&I386_WINDOWS),
            ("macos", "aarch64") => exact(&ARM64_DARWIN)
                .or_else(|| compatible(&AMD64_DARWIN))
                .or_else(|| compatible(&I386_DARWIN)),
            ("macos", "x86_64") => exact(&AMD64_DARWIN).or_else(|| compatible(&I386_DARWIN)),
            ("macos", _) => exact(&I386_DARWIN),
            ("freebsd", "arm") => exact(&ARM_FREEBSD),
            ("freebsd", "x86_64") => exact(&AMD64_FREEBSD),
            ("freebsd", "x86") => exact(&I386_FREEBSD),
            _ => None,
        }
    }
}

/// Best flavour for `host`: an exact build wins over a merely compatible one,
/// ties keep index order.
pub fn select_flavour<'a>(flavours: &'a [Flavour], host: &Host) -> Option<&'a Flavour> {
    let mut best: Option<(HostMatch, &Flavour)> = None;
    for flavour in flavours {
        if let Some(level) = host.matches(&flavour.host) {
            if best.map_or(true, |(current, _)| level > current) {
                best = Some((level, flavour));
            }
        }
    }
    best.map(|(_, flavour)| flavour)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavour(host: &str) -> Flavour {
        Flavour {
            host: host.to_string(),
            resource: Resource {
                url: format!("https://downloads.example.com/{}.tar.gz", host),
                checksum: String::new(),
                archive_file_name: format!("{}.tar.gz", host),
                size: 0,
            },
        }
    }

    #[test]
    fn linux_hosts() {
        let amd64 = Host::new("linux", "x86_64");
        assert_eq!(amd64.matches("x86_64-linux-gnu"), Some(HostMatch::Exact));
        assert_eq!(amd64.matches("x86_64-pc-linux-gnu"), Some(HostMatch::Exact));
        assert_eq!(amd64.matches("i686-linux-gnu"), None);

        let arm = Host::new("linux", "arm");
        assert_eq!(arm.matches("arm-linux-gnueabihf"), Some(HostMatch::Exact));
        assert_eq!(arm.matches("armv7l-unknown-linux-gnueabihf"), Some(HostMatch::Exact));

        let arm64 = Host::new("linux", "aarch64");
        assert_eq!(arm64.matches("aarch64-linux-gnu"), Some(HostMatch::Exact));
        assert_eq!(arm64.matches("arm-linux-gnueabihf"), None);
    }

    #[test]
    fn windows_and_macos_hosts() {
        let win64 = Host::new("windows", "x86_64");
        assert_eq!(win64.matches("i686-mingw32"), Some(HostMatch::Compatible));
        assert_eq!(win64.matches("x86_64-mingw32"), Some(HostMatch::Exact));

        let win32 = Host::new("windows", "x86");
        assert_eq!(win32.matches("x86_64-mingw32"), None);

        let mac_arm = Host::new("macos", "aarch64");
        assert_eq!(mac_arm.matches("arm64-apple-darwin"), Some(HostMatch::Exact));
        assert_eq!(mac_arm.matches("x86_64-apple-darwin12"), Some(HostMatch::Compatible));
        assert_eq!(mac_arm.matches("i386-apple-darwin11"), Some(HostMatch::Compatible));

        let mac_intel = Host::new("macos", "x86_64");
        assert_eq!(mac_intel.matches("arm64-apple-darwin"), None);
    }

    #[test]
    fn all_matches_everything() {
        assert_eq!(Host::new("linux", "x86_64").matches("all"), Some(HostMatch::Compatible));
        assert_eq!(Host::new("plan9", "mips").matches("all"), Some(HostMatch::Compatible));
        assert_eq!(Host::new("plan9", "mips").matches("x86_64-linux-gnu"), None);
    }

    #[test]
    fn exact_flavour_preferred() {
        let flavours = vec![
            flavour("i686-mingw32"),
            flavour("all"),
            flavour("x86_64-mingw32"),
        ];
        let picked = select_flavour(&flavours, &Host::new("windows", "x86_64")).unwrap();
        assert_eq!(picked.host, "x86_64-mingw32");

        let picked = select_flavour(&flavours, &Host::new("windows", "x86")).unwrap();
        assert_eq!(picked.host, "i686-mingw32");

        assert!(select_flavour(&flavours[..1], &Host::new("linux", "x86_64")).is_none());
    }
}
