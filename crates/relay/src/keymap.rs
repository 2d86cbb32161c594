/// Maps a controller key name to the name the PC-side injector understands.
/// Unknown names pass through lowercased.
pub(crate) fn map_key_for_pc(key: &str) -> String {
    let key = key.trim();
    let mapped = match key {
        "ARROW_UP" | "↑" => "up",
        "ARROW_DOWN" | "↓" => "down",
        "ARROW_LEFT" | "←" => "left",
        "ARROW_RIGHT" | "→" => "right",
        "ACTION_A" => "a",
        other => return other.to_lowercase(),
    };
    mapped.to_string()
}

#[cfg(test)]
mod tests {
    use super::map_key_for_pc;

    #[test]
    fn maps_named_and_symbolic_arrows() {
        assert_eq!(map_key_for_pc("ARROW_UP"), "up");
        assert_eq!(map_key_for_pc("↓"), "down");
        assert_eq!(map_key_for_pc("←"), "left");
        assert_eq!(map_key_for_pc("ARROW_RIGHT"), "right");
        assert_eq!(map_key_for_pc("ACTION_A"), "a");
    }

    #[test]
    fn unknown_keys_fall_back_to_lowercase() {
        assert_eq!(map_key_for_pc("SPACE"), "space");
        assert_eq!(map_key_for_pc(" Enter "), "enter");
    }
}
