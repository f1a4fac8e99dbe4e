// SPDX-License-Identifier: AGPL-3.0-or-later

use core::fmt;

use serde::{Deserialize, Serialize};

/// Digest policy advertised in icreq/icresp. `Offered` means the
/// target will accept either digest setting the host proposes;
/// `Required` rejects a connection that tries to negotiate the digest
/// off.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestPolicy {
    #[serde(rename = "Offered", alias = "offered")]
    Offered,
    #[serde(rename = "Required", alias = "required")]
    Required,
}
impl fmt::Display for DigestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DigestPolicy::Offered => "Offered",
            DigestPolicy::Required => "Required",
        })
    }
}
