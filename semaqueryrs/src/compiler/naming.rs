use std::collections::HashSet;

/// Hands out mega-table column names.
///
/// The first claim of a name wins. Later claims of a taken name become
/// `<role>__<name>`, then `<role>__<name>_2`, `_3`, and so on. Claim order is
/// fixed by the builder, so the same request always yields the same names.
#[derive(Debug, Default)]
pub struct ColumnNamer {
    taken: HashSet<String>,
}

impl ColumnNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, role: &str, preferred: &str) -> String {
        if self.taken.insert(preferred.to_string()) {
            return preferred.to_string();
        }
        let prefixed = format!("{role}__{preferred}");
        if self.taken.insert(prefixed.clone()) {
            return prefixed;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{prefixed}_{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_on_collision() {
        let mut namer = ColumnNamer::new();
        assert_eq!(namer.claim("dimension", "revenue"), "revenue");
        assert_eq!(namer.claim("measure", "revenue"), "measure__revenue");
        assert_eq!(namer.claim("measure", "revenue"), "measure__revenue_2");
        assert_eq!(namer.claim("measure", "revenue"), "measure__revenue_3");
        assert_eq!(namer.claim("measure", "cost"), "cost");
    }

    #[test]
    fn prefixed_name_can_itself_be_taken() {
        let mut namer = ColumnNamer::new();
        namer.claim("dimension", "measure__spend");
        namer.claim("dimension", "spend");
        assert_eq!(namer.claim("measure", "spend"), "measure__spend_2");
    }
}
