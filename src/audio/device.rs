//! ALSA device naming.
//!
//! Operators write card/device pairs (`hw:0,0`, `plughw:1`), while the
//! device list handed out by the sound host uses hint names keyed by card
//! id (`hw:CARD=PCH,DEV=0`).

use std::fs;

/// PCM plugins whose `card,device` form has a `CARD=..,DEV=..` hint
const CARD_PLUGINS: &[&str] = &["hw", "plughw"];

/// Names to look for, in order, when opening `requested`.
///
/// The requested string always comes first. A `hw:`/`plughw:` name given as
/// `card[,device]` is followed by its hint form, with a numeric card
/// resolved to its id through `card_id`.
pub fn alsa_hint_names(requested: &str, card_id: impl Fn(u32) -> Option<String>) -> Vec<String> {
    let requested = requested.trim();
    let mut names = vec![requested.to_string()];

    let Some((plugin, rest)) = requested.split_once(':') else {
        return names;
    };
    if !CARD_PLUGINS.contains(&plugin) || rest.contains('=') {
        return names;
    }

    let (card, dev) = match rest.split_once(',') {
        Some((card, dev)) => (card.trim(), dev.trim()),
        None => (rest.trim(), "0"),
    };
    if card.is_empty() || dev.is_empty() {
        return names;
    }

    let id = match card.parse::<u32>() {
        Ok(index) => card_id(index),
        Err(_) => Some(card.to_string()),
    };
    if let Some(id) = id {
        names.push(format!("{}:CARD={},DEV={}", plugin, id, dev));
    }

    names
}

/// Card id of sound card `index`, as the kernel reports it
pub fn proc_card_id(index: u32) -> Option<String> {
    let id = fs::read_to_string(format!("/proc/asound/card{}/id", index)).ok()?;
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}
