//! Three-partition host addresses

use host_api::ValueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exclusive upper bound of every partition
pub const PARTITION_LIMIT: u16 = 65535;

/// A hierarchical address `isp.router.host`
///
/// ISPs sit at `p.0.0`, routers at `p.r.0` and plain hosts at `p.r.h`.
/// `0.0.0` always means "this host".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dca([u16; 3]);

impl Dca {
    pub const LOOPBACK: Dca = Dca([0, 0, 0]);

    pub fn new(isp: u16, router: u16, host: u16) -> Result<Self, ValueError> {
        let dca = Self([isp, router, host]);
        if dca.0.iter().any(|p| *p >= PARTITION_LIMIT) {
            return Err(ValueError::InvalidAddress(dca.to_string()));
        }
        Ok(dca)
    }

    /// Parses `a.b.c`; anything else, including out-of-range parts, is invalid
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let invalid = || ValueError::InvalidAddress(raw.to_string());
        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let mut out = [0u16; 3];
        for (slot, part) in out.iter_mut().zip(parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse::<u16>().map_err(|_| invalid())?;
        }
        Self::new(out[0], out[1], out[2]).map_err(|_| invalid())
    }

    pub fn isp(&self) -> u16 {
        self.0[0]
    }

    pub fn router(&self) -> u16 {
        self.0[1]
    }

    pub fn host(&self) -> u16 {
        self.0[2]
    }

    pub fn is_loopback(&self) -> bool {
        *self == Self::LOOPBACK
    }

    /// Same top partition
    pub fn same_isp(&self, other: &Dca) -> bool {
        self.isp() == other.isp()
    }

    /// Same top two partitions
    pub fn same_router(&self, other: &Dca) -> bool {
        self.same_isp(other) && self.router() == other.router()
    }

    /// Address of the ISP owning partition `isp`
    pub fn for_isp(isp: u16) -> Self {
        Self([isp, 0, 0])
    }

    /// Address of router slot `router` under this ISP address
    pub fn for_router(&self, router: u16) -> Self {
        Self([self.isp(), router, 0])
    }

    /// Address of host slot `host` under this router address
    pub fn for_host(&self, host: u16) -> Self {
        Self([self.isp(), self.router(), host])
    }
}

impl fmt::Display for Dca {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for Dca {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dca::parse(s)
    }
}

impl TryFrom<String> for Dca {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Dca::parse(&value)
    }
}

impl From<Dca> for String {
    fn from(dca: Dca) -> Self {
        dca.to_string()
    }
}
