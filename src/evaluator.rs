use crate::cell::CellValue;
use crate::filter::FilterSet;
use crate::table::Table;
use log::debug;

/// Apply a filter set to a table.
///
/// Active filters (column and value both chosen) are AND-ed; unset filters
/// are ignored. Row order is preserved. With no table loaded the result is
/// the empty table, and a filter on a column the table lacks matches nothing.
pub fn apply(table: Option<&Table>, filters: &FilterSet) -> Table {
    let Some(table) = table else {
        return Table::empty();
    };

    // (column index or None if the column is missing, wanted value)
    let predicates: Vec<(Option<usize>, &CellValue)> = filters
        .active()
        .filter_map(|f| {
            let column = f.selected_column.as_deref()?;
            let value = f.selected_value.as_ref()?;
            Some((table.column_index(column), value))
        })
        .collect();

    if predicates.is_empty() {
        return table.clone();
    }

    let result = table.filter_rows(|cells| {
        predicates.iter().all(|(idx, wanted)| match idx {
            Some(idx) => &cells[*idx] == *wanted,
            None => false,
        })
    });
    debug!(
        "{} active filters kept {} of {} rows",
        predicates.len(),
        result.len(),
        table.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterId;

    fn staff() -> Table {
        Table::new(
            vec!["Name".into(), "Dept".into(), "Level".into()],
            vec![
                vec!["Ann".into(), "Sales".into(), CellValue::Int(2)],
                vec!["Bob".into(), "Ops".into(), CellValue::Int(2)],
                vec!["Cid".into(), "Sales".into(), CellValue::Int(3)],
                vec!["Dee".into(), "Sales".into(), CellValue::Int(2)],
                vec!["Eve".into(), CellValue::Null, CellValue::Int(2)],
            ],
        )
        .unwrap()
    }

    fn with_filter(set: &mut FilterSet, table: &Table, column: &str, value: CellValue) -> FilterId {
        let id = set.add(Some(table)).unwrap();
        set.set_column(id, Some(column), Some(table));
        set.set_value(id, Some(value)).unwrap();
        id
    }

    fn names(table: &Table) -> Vec<String> {
        table
            .column_values("Name")
            .unwrap()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn no_table_gives_empty_result() {
        let result = apply(None, &FilterSet::new());
        assert!(result.columns().is_empty());
        assert!(result.is_empty());
    }

    #[test]
    fn zero_active_filters_returns_the_table_unchanged() {
        let table = staff();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();
        set.set_column(id, Some("Dept"), Some(&table));
        // column chosen but no value: ignored
        assert_eq!(apply(Some(&table), &set), table);
    }

    #[test]
    fn filters_are_conjunctive_and_stable() {
        let table = staff();
        let mut set = FilterSet::new();
        with_filter(&mut set, &table, "Dept", "Sales".into());
        assert_eq!(names(&apply(Some(&table), &set)), vec!["Ann", "Cid", "Dee"]);

        with_filter(&mut set, &table, "Level", CellValue::Int(2));
        let result = apply(Some(&table), &set);
        assert_eq!(names(&result), vec!["Ann", "Dee"]);
        assert_eq!(result.columns(), table.columns());
    }

    #[test]
    fn equality_is_typed() {
        let table = Table::new(
            vec!["Name".into(), "Code".into()],
            vec![
                vec!["Ann".into(), CellValue::Int(2)],
                vec!["Bob".into(), "2".into()],
            ],
        )
        .unwrap();
        let mut set = FilterSet::new();
        with_filter(&mut set, &table, "Code", "2".into());
        assert_eq!(names(&apply(Some(&table), &set)), vec!["Bob"]);
    }

    #[test]
    fn applying_twice_gives_the_same_rows() {
        let table = staff();
        let mut set = FilterSet::new();
        with_filter(&mut set, &table, "Dept", "Sales".into());
        let first = apply(Some(&table), &set);
        let second = apply(Some(&table), &set);
        assert_eq!(first, second);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn more_filters_never_add_rows_and_keep_original_order() {
        let table = staff();
        let mut set = FilterSet::new();
        let mut previous = apply(Some(&table), &set).len();
        for (column, value) in [
            ("Level", CellValue::Int(2)),
            ("Dept", "Sales".into()),
            ("Name", "Dee".into()),
        ] {
            with_filter(&mut set, &table, column, value);
            let result = apply(Some(&table), &set);
            assert!(result.len() <= previous);
            previous = result.len();

            // result rows form a subsequence of the source rows
            let mut source = table.rows().iter();
            for row in result.rows() {
                assert!(source.any(|candidate| candidate == row));
            }
        }
        assert_eq!(previous, 1);
    }

    #[test]
    fn filter_on_missing_column_matches_nothing() {
        let table = staff();
        let mut set = FilterSet::new();
        let id = set.add(Some(&table)).unwrap();
        set.set_column(id, Some("Dept"), Some(&table));
        set.set_value(id, Some("Sales".into())).unwrap();

        let other = Table::new(vec!["Name".into()], vec![vec!["Ann".into()]]).unwrap();
        assert!(apply(Some(&other), &set).is_empty());
    }
}
