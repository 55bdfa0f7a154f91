//! Manifest claims for container signing, in the atomic container signature
//! format: a fixed JSON descriptor of digest and reference, base64-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

/// Creator tag written into every claim.
pub const CLAIM_CREATOR: &str = "msg-sign";

const CLAIM_TYPE: &str = "atomic container signature";

#[derive(Serialize)]
struct ManifestClaim<'a> {
    critical: Critical<'a>,
    optional: Optional,
}

#[derive(Serialize)]
struct Critical<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    image: Image<'a>,
    identity: Identity<'a>,
}

#[derive(Serialize)]
struct Image<'a> {
    #[serde(rename = "docker-manifest-digest")]
    digest: &'a str,
}

#[derive(Serialize)]
struct Identity<'a> {
    #[serde(rename = "docker-reference")]
    reference: &'a str,
}

#[derive(Serialize)]
struct Optional {
    creator: &'static str,
}

/// Build the base64 manifest claim for one digest/reference pair.
///
/// Field order is fixed by the descriptor types, so equal inputs always
/// encode to identical text.
#[must_use]
pub fn create_manifest_claim(digest: &str, reference: &str) -> String {
    let claim = ManifestClaim {
        critical: Critical {
            kind: CLAIM_TYPE,
            image: Image { digest },
            identity: Identity { reference },
        },
        optional: Optional {
            creator: CLAIM_CREATOR,
        },
    };
    // Serializing borrowed strings into a Vec cannot fail.
    let json = serde_json::to_vec(&claim).unwrap_or_default();
    STANDARD.encode(json)
}
