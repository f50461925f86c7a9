//! Player zone derivation from account ids.

/// The region an account id was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerZone {
    China,
    Japan,
    Other,
    Unknown,
}

/// Derives the zone from the region bits of an account id (`id >> 23`).
pub fn player_zone(account_id: u64) -> PlayerZone {
    match account_id >> 23 {
        0..=6 => PlayerZone::China,
        7..=12 => PlayerZone::Japan,
        13..=15 => PlayerZone::Other,
        _ => PlayerZone::Unknown,
    }
}
