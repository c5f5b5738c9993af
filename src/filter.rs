use crate::cell::CellValue;
use crate::table::Table;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Identity of a filter row. Issued from a counter and never reused, so it
/// stays attached to the same filter however many others are removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(pub u64);

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("no filter {0}")]
    UnknownFilter(FilterId),

    #[error("filter {0} has no column to pick a value from")]
    Disabled(FilterId),

    #[error("'{value}' does not occur in column {column}")]
    UnavailableValue { column: String, value: CellValue },
}

/// One `column == value` constraint as the user is building it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Filter {
    pub id: FilterId,
    pub selected_column: Option<String>,
    pub selected_value: Option<CellValue>,
    /// Distinct non-null values of `selected_column`, first-seen order.
    pub candidate_values: Vec<CellValue>,
    /// Whether the value picker can be used.
    pub enabled: bool,
}

impl Filter {
    fn new(id: FilterId) -> Self {
        Filter {
            id,
            selected_column: None,
            selected_value: None,
            candidate_values: Vec::new(),
            enabled: false,
        }
    }

    /// Both column and value are chosen, so the filter constrains rows.
    pub fn is_active(&self) -> bool {
        self.selected_column.is_some() && self.selected_value.is_some()
    }

    fn bind(&mut self, table: Option<&Table>) {
        let column = self.selected_column.as_deref();
        match (column, table) {
            (Some(column), Some(table)) if table.has_column(column) => {
                self.candidate_values = candidate_values(table, column);
                self.enabled = true;
            }
            _ => {
                self.candidate_values.clear();
                self.enabled = false;
            }
        }
    }
}

/// Distinct non-null values of `column` in the order they first appear.
/// Empty when the column does not exist.
pub fn candidate_values(table: &Table, column: &str) -> Vec<CellValue> {
    let Some(values) = table.column_values(column) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for value in values {
        if value.is_null() {
            continue;
        }
        if seen.insert(value) {
            distinct.push(value.clone());
        }
    }
    distinct
}

/// The ordered, conjunctive collection of filters for one session.
///
/// Insertion order is display order. Removal and updates always go through
/// [`FilterId`], never through a position in the list.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FilterSet {
    filters: Vec<Filter>,
    #[serde(skip)]
    next_id: u64,
}

impl FilterSet {
    pub fn new() -> Self {
        FilterSet::default()
    }

    /// Append an empty filter. Nothing happens while no table is loaded.
    pub fn add(&mut self, table: Option<&Table>) -> Option<FilterId> {
        if table.is_none() {
            return None;
        }

        let id = FilterId(self.next_id);
        self.next_id += 1;
        self.filters.push(Filter::new(id));
        debug!("added filter {}", id);
        Some(id)
    }

    /// Remove the filter carrying `id`. Unknown ids leave the set untouched.
    pub fn remove(&mut self, id: FilterId) -> Option<Filter> {
        let pos = self.filters.iter().position(|f| f.id == id)?;
        debug!("removed filter {} at position {}", id, pos);
        Some(self.filters.remove(pos))
    }

    /// Bind a filter to `column` (or unbind it with `None`) and recompute its
    /// value domain from `table`. The previously chosen value is dropped.
    ///
    /// Returns the new candidate values and whether the value picker is
    /// enabled, or `None` when no filter has this id.
    pub fn set_column(
        &mut self,
        id: FilterId,
        column: Option<&str>,
        table: Option<&Table>,
    ) -> Option<(&[CellValue], bool)> {
        let filter = self.get_mut(id)?;
        filter.selected_column = column.map(str::to_string);
        filter.selected_value = None;
        filter.bind(table);
        Some((filter.candidate_values.as_slice(), filter.enabled))
    }

    /// Choose (or clear) the value of a filter.
    ///
    /// Only one of the filter's candidate values can be chosen, so a disabled
    /// filter accepts nothing but `None`.
    pub fn set_value(
        &mut self,
        id: FilterId,
        value: Option<CellValue>,
    ) -> Result<(), FilterError> {
        let filter = self.get_mut(id).ok_or(FilterError::UnknownFilter(id))?;

        if let Some(value) = &value {
            if !filter.enabled {
                return Err(FilterError::Disabled(id));
            }
            if !filter.candidate_values.contains(value) {
                return Err(FilterError::UnavailableValue {
                    column: filter.selected_column.clone().unwrap_or_default(),
                    value: value.clone(),
                });
            }
        }

        filter.selected_value = value;
        Ok(())
    }

    /// Re-derive every filter from a newly uploaded table.
    ///
    /// Filters whose column disappeared are disabled and lose their value;
    /// a value that no longer occurs in its column is cleared.
    pub fn refresh(&mut self, table: Option<&Table>) {
        for filter in &mut self.filters {
            filter.bind(table);
            let stale = match &filter.selected_value {
                Some(value) => !filter.enabled || !filter.candidate_values.contains(value),
                None => false,
            };
            if stale {
                debug!("filter {} lost its value after refresh", filter.id);
                filter.selected_value = None;
            }
        }
    }

    pub fn get(&self, id: FilterId) -> Option<&Filter> {
        self.filters.iter().find(|f| f.id == id)
    }

    fn get_mut(&mut self, id: FilterId) -> Option<&mut Filter> {
        self.filters.iter_mut().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Filters that actually constrain rows.
    pub fn active(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter().filter(|f| f.is_active())
    }

    pub fn ids(&self) -> Vec<FilterId> {
        self.filters.iter().map(|f| f.id).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Table {
        Table::new(
            vec!["Dept".into(), "City".into()],
            vec![
                vec!["Sales".into(), "Oslo".into()],
                vec!["Ops".into(), CellValue::Null],
                vec!["Sales".into(), "Rome".into()],
                vec![CellValue::Null, "Oslo".into()],
                vec!["HR".into(), "Oslo".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn add_without_table_is_a_no_op() {
        let mut set = FilterSet::new();
        assert_eq!(set.add(None), None);
        assert!(set.is_empty());
    }

    #[test]
    fn new_filter_starts_unbound_and_disabled() {
        let table = people();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();

        let filter = set.get(id).unwrap();
        assert_eq!(filter.selected_column, None);
        assert_eq!(filter.selected_value, None);
        assert!(filter.candidate_values.is_empty());
        assert!(!filter.enabled);
    }

    #[test]
    fn candidates_are_distinct_non_null_in_first_seen_order() {
        let table = people();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();

        let (values, enabled) = set.set_column(id, Some("Dept"), Some(&table)).unwrap();
        assert!(enabled);
        assert_eq!(
            values,
            &[
                CellValue::Text("Sales".into()),
                CellValue::Text("Ops".into()),
                CellValue::Text("HR".into()),
            ]
        );
    }

    #[test]
    fn clearing_the_column_disables_the_value_picker() {
        let table = people();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();
        set.set_column(id, Some("City"), Some(&table));
        set.set_value(id, Some("Oslo".into())).unwrap();

        let (values, enabled) = set.set_column(id, None, Some(&table)).unwrap();
        assert!(values.is_empty());
        assert!(!enabled);
        assert_eq!(set.get(id).unwrap().selected_value, None);
    }

    #[test]
    fn unknown_column_yields_empty_disabled_filter() {
        let table = people();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();
        let (values, enabled) = set.set_column(id, Some("Salary"), Some(&table)).unwrap();
        assert!(values.is_empty());
        assert!(!enabled);
    }

    #[test]
    fn removing_a_middle_filter_keeps_identities_and_selections() {
        let table = people();
        let mut set = FilterSet::new();
        let a = set.add(Some(&table)).unwrap();
        let b = set.add(Some(&table)).unwrap();
        let c = set.add(Some(&table)).unwrap();
        assert_eq!((a, b, c), (FilterId(0), FilterId(1), FilterId(2)));

        set.set_column(a, Some("Dept"), Some(&table));
        set.set_value(a, Some("Sales".into())).unwrap();
        set.set_column(c, Some("City"), Some(&table));
        set.set_value(c, Some("Oslo".into())).unwrap();

        let removed = set.remove(b).unwrap();
        assert_eq!(removed.id, b);
        assert_eq!(set.len(), 2);
        assert_eq!(set.ids(), vec![FilterId(0), FilterId(2)]);

        // id 2 still refers to the City filter, not to whatever now sits at position 1
        let third = set.get(FilterId(2)).unwrap();
        assert_eq!(third.selected_column.as_deref(), Some("City"));
        assert_eq!(third.selected_value, Some(CellValue::Text("Oslo".into())));
        assert!(set.get(FilterId(1)).is_none());
    }

    #[test]
    fn ids_are_never_reused() {
        let table = people();
        let mut set = FilterSet::new();
        let a = set.add(Some(&table)).unwrap();
        set.remove(a);
        let b = set.add(Some(&table)).unwrap();
        assert_ne!(a, b);
        assert_eq!(b, FilterId(1));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let table = people();
        let mut set = FilterSet::new();
        set.add(Some(&table));
        assert!(set.remove(FilterId(9)).is_none());
        assert!(set.set_column(FilterId(9), Some("Dept"), Some(&table)).is_none());
        assert_eq!(
            set.set_value(FilterId(9), None),
            Err(FilterError::UnknownFilter(FilterId(9)))
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn refresh_disables_filters_whose_column_vanished() {
        let table = people();
        let mut set = FilterSet::new();
        let dept = set.add(Some(&table)).unwrap();
        let city = set.add(Some(&table)).unwrap();
        set.set_column(dept, Some("Dept"), Some(&table));
        set.set_value(dept, Some("Sales".into())).unwrap();
        set.set_column(city, Some("City"), Some(&table));
        set.set_value(city, Some("Rome".into())).unwrap();

        let next = Table::new(
            vec!["City".into()],
            vec![vec!["Oslo".into()], vec!["Paris".into()]],
        )
        .unwrap();
        set.refresh(Some(&next));

        let dept = set.get(dept).unwrap();
        assert!(!dept.enabled);
        assert!(dept.candidate_values.is_empty());
        assert_eq!(dept.selected_value, None);
        assert_eq!(dept.selected_column.as_deref(), Some("Dept"));

        let city = set.get(city).unwrap();
        assert!(city.enabled);
        assert_eq!(city.candidate_values.len(), 2);
        // Rome is gone from the new upload
        assert_eq!(city.selected_value, None);
    }

    #[test]
    fn refresh_without_table_disables_everything() {
        let table = people();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();
        set.set_column(id, Some("Dept"), Some(&table));
        set.refresh(None);
        assert!(!set.get(id).unwrap().enabled);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn value_must_come_from_the_candidates() {
        let table = people();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();
        set.set_column(id, Some("Dept"), Some(&table));

        assert_eq!(
            set.set_value(id, Some("Finance".into())),
            Err(FilterError::UnavailableValue {
                column: "Dept".into(),
                value: "Finance".into(),
            })
        );
        assert_eq!(set.get(id).unwrap().selected_value, None);
        assert_eq!(set.active().count(), 0);

        set.set_value(id, Some("Ops".into())).unwrap();
        assert!(set.get(id).unwrap().is_active());
    }

    #[test]
    fn disabled_filter_only_accepts_clearing() {
        let table = people();
        let mut set = FilterSet::new();
        let unbound = set.add(Some(&table)).unwrap();
        let missing = set.add(Some(&table)).unwrap();
        set.set_column(missing, Some("Gone"), Some(&table));

        for id in [unbound, missing] {
            assert_eq!(
                set.set_value(id, Some("Sales".into())),
                Err(FilterError::Disabled(id))
            );
            assert_eq!(set.set_value(id, None), Ok(()));
        }
        assert_eq!(set.active().count(), 0);
    }
}
