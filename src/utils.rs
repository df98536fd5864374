//! Identifier minting helpers
//!
//! Property and negotiation ids are uuid7 values encoded as bech32m strings
//! with a human-readable prefix. The prefix doubles as the sled key
//! namespace, so both record kinds can share one keyspace without colliding.
//! User ids are caller-supplied and never minted here.

use bech32::Bech32m;
use uuid7::uuid7;

pub const PROPERTY_PREFIX: &str = "prop_";
pub const NEGOTIATION_PREFIX: &str = "neg_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}
