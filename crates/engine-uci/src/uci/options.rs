//! UCI option registry
//!
//! Holds every option with its type, default and current value, prints
//! the `option name ...` block for the `uci` handshake, and clamps spin
//! values into range on `setoption`.

use std::collections::BTreeMap;

/// Option type with default and constraints
#[derive(Clone, Debug)]
pub enum OptionKind {
    Check { default: bool },
    Spin { default: i64, min: i64, max: i64 },
    Button,
}

#[derive(Clone, Debug)]
struct UciOption {
    kind: OptionKind,
    value: String,
    /// Registration order for the `uci` listing
    order: usize,
}

/// The option table
pub struct OptionRegistry {
    options: BTreeMap<String, UciOption>,
}

impl OptionRegistry {
    /// Build the default option set
    pub fn new(max_threads: i64, default_threads: i64) -> OptionRegistry {
        let mut reg = OptionRegistry { options: BTreeMap::new() };

        reg.add("Hash", OptionKind::Spin { default: 32, min: 4, max: 4096 });
        reg.add("Clear Hash", OptionKind::Button);
        reg.add(
            "Threads",
            OptionKind::Spin { default: default_threads, min: 1, max: max_threads },
        );
        reg.add("Ponder", OptionKind::Check { default: true });
        reg.add("OwnBook", OptionKind::Check { default: false });
        reg.add("MultiPV", OptionKind::Spin { default: 1, min: 1, max: 500 });
        reg.add("UCI_Chess960", OptionKind::Check { default: false });
        reg.add("Minimum Split Depth", OptionKind::Spin { default: 4, min: 4, max: 7 });
        reg.add(
            "Maximum Number of Threads per Split Point",
            OptionKind::Spin { default: 5, min: 4, max: 8 },
        );
        reg.add("Use Sleeping Threads", OptionKind::Check { default: true });

        for side in ["PV nodes", "non-PV nodes"] {
            for ext in [
                "Check Extension",
                "Single Evasion Extension",
                "Mate Threat Extension",
                "Pawn Push to 7th Extension",
                "Passed Pawn Extension",
                "Pawn Endgame Extension",
            ] {
                let default = default_extension(ext, side == "PV nodes");
                reg.add(
                    &format!("{ext} ({side})"),
                    OptionKind::Spin { default, min: 0, max: 2 },
                );
            }
        }

        reg
    }

    fn add(&mut self, name: &str, kind: OptionKind) {
        let value = match &kind {
            OptionKind::Check { default } => default.to_string(),
            OptionKind::Spin { default, .. } => default.to_string(),
            OptionKind::Button => String::new(),
        };
        let order = self.options.len();
        self.options.insert(name.to_string(), UciOption { kind, value, order });
    }

    /// `option name ...` lines for the `uci` handshake
    pub fn uci_lines(&self) -> Vec<String> {
        let mut entries: Vec<(&String, &UciOption)> = self.options.iter().collect();
        entries.sort_by_key(|(_, o)| o.order);

        entries
            .iter()
            .map(|(name, opt)| match &opt.kind {
                OptionKind::Check { default } => {
                    format!("option name {name} type check default {default}")
                }
                OptionKind::Spin { default, min, max } => format!(
                    "option name {name} type spin default {default} min {min} max {max}"
                ),
                OptionKind::Button => format!("option name {name} type button"),
            })
            .collect()
    }

    /// Apply a `setoption`; returns false for an unknown option name
    pub fn set(&mut self, name: &str, value: Option<&str>) -> bool {
        let Some(opt) = self.options.get_mut(name) else { return false };

        match &opt.kind {
            OptionKind::Check { .. } => {
                if let Some(v) = value {
                    opt.value = (v == "true").to_string();
                }
            }
            OptionKind::Spin { min, max, default } => {
                let parsed = value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(*default);
                opt.value = parsed.clamp(*min, *max).to_string();
            }
            OptionKind::Button => {}
        }
        true
    }

    /// Current value of a spin option
    pub fn spin(&self, name: &str) -> i64 {
        self.options
            .get(name)
            .and_then(|o| o.value.parse().ok())
            .unwrap_or_else(|| panic!("unregistered spin option: {name}"))
    }

    /// Current value of a check option
    pub fn check(&self, name: &str) -> bool {
        self.options.get(name).map(|o| o.value == "true").unwrap_or(false)
    }
}

fn default_extension(name: &str, pv: bool) -> i64 {
    match (name, pv) {
        ("Check Extension", true) => 2,
        ("Check Extension", false) => 1,
        ("Single Evasion Extension", _) => 2,
        ("Mate Threat Extension", _) => 0,
        ("Pawn Push to 7th Extension", _) => 1,
        ("Passed Pawn Extension", true) => 1,
        ("Passed Pawn Extension", false) => 0,
        ("Pawn Endgame Extension", _) => 2,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OptionRegistry {
        OptionRegistry::new(32, 1)
    }

    #[test]
    fn test_defaults() {
        let reg = registry();
        assert_eq!(reg.spin("Hash"), 32);
        assert_eq!(reg.spin("MultiPV"), 1);
        assert!(reg.check("Ponder"));
        assert!(!reg.check("UCI_Chess960"));
        assert_eq!(reg.spin("Check Extension (PV nodes)"), 2);
        assert_eq!(reg.spin("Check Extension (non-PV nodes)"), 1);
    }

    #[test]
    fn test_set_and_clamp() {
        let mut reg = registry();
        assert!(reg.set("Hash", Some("128")));
        assert_eq!(reg.spin("Hash"), 128);

        // Out-of-range values are clamped into [min, max]
        assert!(reg.set("Hash", Some("100000")));
        assert_eq!(reg.spin("Hash"), 4096);
        assert!(reg.set("Hash", Some("1")));
        assert_eq!(reg.spin("Hash"), 4);

        assert!(reg.set("Ponder", Some("false")));
        assert!(!reg.check("Ponder"));
    }

    #[test]
    fn test_unknown_option() {
        let mut reg = registry();
        assert!(!reg.set("Fruit Salad", Some("1")));
    }

    #[test]
    fn test_uci_lines_contain_required_options() {
        let reg = registry();
        let lines = reg.uci_lines().join("\n");
        for required in [
            "option name Hash type spin default 32 min 4 max 4096",
            "option name MultiPV type spin default 1 min 1 max 500",
            "option name Threads type spin",
            "option name Minimum Split Depth type spin default 4 min 4 max 7",
            "option name Use Sleeping Threads type check default true",
            "option name Clear Hash type button",
        ] {
            assert!(lines.contains(required), "missing: {required}\n{lines}");
        }
    }
}
