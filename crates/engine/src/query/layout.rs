//! Column directives: `=frag` (show only) and `frag@N` (pin to position N).
//!
//! Directives never filter rows. They come from the whole query string at
//! once and describe one column layout for it.

use super::filter::ColumnName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityDirective {
    pub fragment: String,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDirective {
    pub fragment: String,
    pub exact: bool,
    /// 1-based display position
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDirectives {
    pub visibility: Vec<VisibilityDirective>,
    pub ordering: Vec<OrderDirective>,
}

impl ColumnDirectives {
    pub fn is_empty(&self) -> bool {
        self.visibility.is_empty() && self.ordering.is_empty()
    }

    /// Resolve the displayed column order.
    ///
    /// Visibility directives are ORed: a column is shown when any of them
    /// matches. Pins are placed in declaration order; a pin whose position is
    /// already taken, or whose column is already pinned, is ignored. Positions
    /// past the end clamp to the last slot.
    pub fn apply(&self, columns: &[String]) -> Vec<String> {
        let names: Vec<ColumnName> = columns.iter().map(|c| ColumnName::new(c)).collect();

        let shown: Vec<usize> = (0..columns.len())
            .filter(|&i| {
                self.visibility.is_empty()
                    || self
                        .visibility
                        .iter()
                        .any(|d| names[i].matches(&d.fragment, d.exact))
            })
            .collect();

        if self.ordering.is_empty() || shown.is_empty() {
            return shown.into_iter().map(|i| columns[i].clone()).collect();
        }

        let mut slots: Vec<Option<usize>> = vec![None; shown.len()];
        let mut pinned: Vec<usize> = Vec::new();
        for directive in &self.ordering {
            let Some(&col) = shown
                .iter()
                .find(|&&i| !pinned.contains(&i) && names[i].matches(&directive.fragment, directive.exact))
            else {
                continue;
            };
            let slot = directive.position.clamp(1, shown.len()) - 1;
            if slots[slot].is_some() {
                log::debug!("column pin '{}@{}' ignored: position taken", directive.fragment, directive.position);
                continue;
            }
            slots[slot] = Some(col);
            pinned.push(col);
        }

        let mut rest = shown.iter().copied().filter(|i| !pinned.contains(i));
        slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| rest.next()))
            .map(|i| columns[i].clone())
            .collect()
    }
}
