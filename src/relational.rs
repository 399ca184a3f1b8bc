//! Relational algebra over [`TabularDataset`].
//!
//! Every operation preserves the input row order. Deduplication keeps the
//! first occurrence, joins emit left rows in order with their matches in
//! right-hand order, and melt emits one block per value column.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, ensure};

use crate::{
    data::{Value, truncate_chars},
    dataset::{Row, TabularDataset},
};

const KEY_SEPARATOR: &str = "\u{1f}";
const NULL_MARKER: &str = "\u{0}";

pub(crate) fn row_key(row: &Row, indices: &[usize]) -> String {
    let mut parts = Vec::with_capacity(indices.len());
    for idx in indices {
        match &row[*idx] {
            Some(value) => parts.push(value.as_display()),
            None => parts.push(NULL_MARKER.to_string()),
        }
    }
    parts.join(KEY_SEPARATOR)
}

fn all_indices(dataset: &TabularDataset) -> Vec<usize> {
    (0..dataset.columns().len()).collect()
}

impl TabularDataset {
    /// Projects the named columns in the given order.
    pub fn select(&self, columns: &[&str]) -> Result<Self> {
        let indices = self.require_columns(columns)?;
        let rows = self
            .rows()
            .iter()
            .map(|row| indices.iter().map(|idx| row[*idx].clone()).collect())
            .collect();
        Ok(Self::from_parts(
            self.name().to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
            rows,
        ))
    }

    /// Renames columns; names not present are ignored.
    pub fn rename(self, pairs: &[(&str, &str)]) -> Self {
        let (name, mut columns, rows) = self.into_parts();
        for column in columns.iter_mut() {
            if let Some((_, to)) = pairs.iter().find(|(from, _)| from == column) {
                *column = to.to_string();
            }
        }
        Self::from_parts(name, columns, rows)
    }

    /// Drops rows with a null in any of `subset` (all columns when empty).
    pub fn drop_nulls(self, subset: &[&str]) -> Result<Self> {
        let indices = if subset.is_empty() {
            all_indices(&self)
        } else {
            self.require_columns(subset)?
        };
        let (name, columns, rows) = self.into_parts();
        let rows = rows
            .into_iter()
            .filter(|row| indices.iter().all(|idx| row[*idx].is_some()))
            .collect();
        Ok(Self::from_parts(name, columns, rows))
    }

    /// Drops rows where every column of `subset` is null.
    pub fn drop_all_null(self, subset: &[&str]) -> Result<Self> {
        let indices = self.require_columns(subset)?;
        let (name, columns, rows) = self.into_parts();
        let rows = rows
            .into_iter()
            .filter(|row| indices.iter().any(|idx| row[*idx].is_some()))
            .collect();
        Ok(Self::from_parts(name, columns, rows))
    }

    /// Removes exact duplicate rows, keeping the first occurrence.
    pub fn distinct(self) -> Self {
        let indices = all_indices(&self);
        self.distinct_on(&indices)
    }

    /// Removes rows whose `key` columns repeat an earlier row.
    pub fn distinct_by(self, key: &[&str]) -> Result<Self> {
        let indices = self.require_columns(key)?;
        Ok(self.distinct_on(&indices))
    }

    fn distinct_on(self, indices: &[usize]) -> Self {
        let (name, columns, rows) = self.into_parts();
        let mut seen = HashSet::new();
        let rows = rows
            .into_iter()
            .filter(|row| seen.insert(row_key(row, indices)))
            .collect();
        Self::from_parts(name, columns, rows)
    }

    /// Appends a column holding the same value on every row.
    pub fn with_constant(self, column: &str, value: Option<Value>) -> Self {
        let (name, mut columns, rows) = self.into_parts();
        columns.push(column.to_string());
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.push(value.clone());
                row
            })
            .collect();
        Self::from_parts(name, columns, rows)
    }

    /// Rewrites one column cell by cell.
    pub fn map_column<F>(self, column: &str, mut f: F) -> Result<Self>
    where
        F: FnMut(Option<Value>) -> Option<Value>,
    {
        let idx = self.require_column(column)?;
        let (name, columns, rows) = self.into_parts();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                let cell = row[idx].take();
                row[idx] = f(cell);
                row
            })
            .collect();
        Ok(Self::from_parts(name, columns, rows))
    }

    /// Casts the column to text and truncates it to `width` characters.
    pub fn truncate_column(self, column: &str, width: usize) -> Result<Self> {
        self.map_column(column, |cell| {
            cell.map(|value| {
                let text = match value {
                    Value::Text(s) => s,
                    other => other.as_display(),
                };
                Value::Text(truncate_chars(&text, width))
            })
        })
    }

    pub fn fill_null(self, column: &str, value: Value) -> Result<Self> {
        self.map_column(column, |cell| cell.or_else(|| Some(value.clone())))
    }

    /// Reorders columns; every existing column must be named exactly once.
    pub fn reorder(self, order: &[&str]) -> Result<Self> {
        ensure!(
            order.len() == self.columns().len(),
            "Reordering '{}' requires all {} column(s)",
            self.name(),
            self.columns().len()
        );
        self.select(order)
    }

    /// Left join on equal key columns. The output holds every left column
    /// followed by the right table's non-key columns.
    pub fn left_join(&self, right: &TabularDataset, on: &[&str]) -> Result<Self> {
        let left_keys = self.require_columns(on)?;
        let right_keys = right.require_columns(on)?;

        let mut columns = self.columns().to_vec();
        let mut seen: HashSet<String> = columns.iter().cloned().collect();
        let mut right_columns = Vec::new();
        for (idx, name) in right.columns().iter().enumerate() {
            if right_keys.contains(&idx) {
                continue;
            }
            let mut candidate = name.clone();
            let mut counter = 1usize;
            while seen.contains(&candidate) {
                candidate = format!("right_{name}_{counter}");
                counter += 1;
            }
            seen.insert(candidate.clone());
            columns.push(candidate);
            right_columns.push(idx);
        }

        let mut lookup: HashMap<String, Vec<&Row>> = HashMap::new();
        for row in right.rows() {
            if right_keys.iter().any(|idx| row[*idx].is_none()) {
                continue;
            }
            lookup.entry(row_key(row, &right_keys)).or_default().push(row);
        }

        let mut rows = Vec::with_capacity(self.len());
        for row in self.rows() {
            let matches = if left_keys.iter().any(|idx| row[*idx].is_none()) {
                None
            } else {
                lookup.get(&row_key(row, &left_keys))
            };
            match matches {
                Some(bucket) => {
                    for matched in bucket {
                        let mut combined = row.clone();
                        combined.extend(right_columns.iter().map(|idx| matched[*idx].clone()));
                        rows.push(combined);
                    }
                }
                None => {
                    let mut combined = row.clone();
                    combined.extend(right_columns.iter().map(|_| None));
                    rows.push(combined);
                }
            }
        }
        Ok(Self::from_parts(self.name().to_string(), columns, rows))
    }

    /// Unpivots `value_vars` into long form. Each `(column, tag)` pair emits
    /// one row per input row carrying `tag` in `tag_column` and the cell in
    /// `value_column`.
    pub fn melt(
        &self,
        id_vars: &[&str],
        value_vars: &[(&str, Value)],
        tag_column: &str,
        value_column: &str,
    ) -> Result<Self> {
        let id_indices = self.require_columns(id_vars)?;
        let value_indices = value_vars
            .iter()
            .map(|(column, tag)| -> Result<(usize, Value)> {
                Ok((self.require_column(column)?, tag.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut columns: Vec<String> = id_vars.iter().map(|c| c.to_string()).collect();
        columns.push(tag_column.to_string());
        columns.push(value_column.to_string());

        let mut rows = Vec::with_capacity(self.len() * value_indices.len());
        for (value_idx, tag) in &value_indices {
            for row in self.rows() {
                let mut melted: Row = id_indices.iter().map(|idx| row[*idx].clone()).collect();
                melted.push(Some(tag.clone()));
                melted.push(row[*value_idx].clone());
                rows.push(melted);
            }
        }
        Ok(Self::from_parts(self.name().to_string(), columns, rows))
    }

    /// Groups by `keys` in order of first appearance and averages `value`,
    /// ignoring nulls. The output has the key columns followed by `value`.
    pub fn group_mean(&self, keys: &[&str], value: &str) -> Result<Self> {
        let key_indices = self.require_columns(keys)?;
        let value_idx = self.require_column(value)?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (Row, f64, usize)> = HashMap::new();
        for row in self.rows() {
            let key = row_key(row, &key_indices);
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                (
                    key_indices.iter().map(|idx| row[*idx].clone()).collect(),
                    0.0,
                    0,
                )
            });
            if let Some(number) = row[value_idx].as_ref().and_then(Value::as_f64) {
                entry.1 += number;
                entry.2 += 1;
            }
        }

        let mut columns: Vec<String> = keys.iter().map(|c| c.to_string()).collect();
        columns.push(value.to_string());
        let rows = order
            .into_iter()
            .filter_map(|key| groups.remove(&key))
            .map(|(mut key_cells, sum, count)| {
                let mean = (count > 0).then(|| Value::Float(sum / count as f64));
                key_cells.push(mean);
                key_cells
            })
            .collect();
        Ok(Self::from_parts(self.name().to_string(), columns, rows))
    }
}

/// Union-all of datasets sharing the same column list.
pub fn concat(name: &str, parts: Vec<TabularDataset>) -> Result<TabularDataset> {
    let mut iter = parts.into_iter();
    let Some(first) = iter.next() else {
        return Ok(TabularDataset::new(name, Vec::<String>::new()));
    };
    let (_, columns, mut rows) = first.into_parts();
    for part in iter {
        ensure!(
            part.columns() == columns.as_slice(),
            "Cannot concatenate '{}' with columns {:?} onto {:?}",
            part.name(),
            part.columns(),
            columns
        );
        let (_, _, more) = part.into_parts();
        rows.extend(more);
    }
    Ok(TabularDataset::from_parts(name.to_string(), columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{float, int, text};

    fn sample() -> TabularDataset {
        TabularDataset::from_rows(
            "sample",
            vec!["iso_code", "year", "coal", "oil"],
            vec![
                vec![text("BRA"), int(2020), float(1.0), None],
                vec![text("BRA"), int(2021), float(2.0), float(3.0)],
                vec![None, int(2021), float(9.0), float(9.0)],
            ],
        )
        .expect("sample")
    }

    #[test]
    fn drop_nulls_checks_only_subset() {
        let out = sample().drop_nulls(&["iso_code"]).expect("drop");
        assert_eq!(out.len(), 2);
        let out = sample().drop_nulls(&[]).expect("drop all");
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(0, "year"), Some(&Value::Integer(2021)));
    }

    #[test]
    fn drop_all_null_keeps_rows_with_one_value() {
        let dataset = TabularDataset::from_rows(
            "t",
            vec!["a", "b"],
            vec![vec![None, None], vec![None, int(1)], vec![int(2), None]],
        )
        .expect("dataset");
        let out = dataset.drop_all_null(&["a", "b"]).expect("drop");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn distinct_by_keeps_first_occurrence() {
        let dataset = TabularDataset::from_rows(
            "regions",
            vec!["code", "name"],
            vec![
                vec![text("LAC"), text("Latin America")],
                vec![text("EAP"), text("East Asia")],
                vec![text("LAC"), text("Latin America & Caribbean")],
            ],
        )
        .expect("dataset");
        let out = dataset.distinct_by(&["code"]).expect("distinct");
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0, "name"), Some(&Value::Text("Latin America".into())));
    }

    #[test]
    fn distinct_treats_null_and_empty_text_differently() {
        let dataset = TabularDataset::from_rows(
            "t",
            vec!["a"],
            vec![vec![None], vec![text("")], vec![None]],
        )
        .expect("dataset");
        assert_eq!(dataset.distinct().len(), 2);
    }

    #[test]
    fn melt_emits_one_block_per_value_column() {
        let out = sample()
            .melt(
                &["iso_code", "year"],
                &[("coal", Value::Integer(2)), ("oil", Value::Integer(3))],
                "source_id",
                "value",
            )
            .expect("melt");
        assert_eq!(out.columns(), ["iso_code", "year", "source_id", "value"]);
        assert_eq!(out.len(), 6);
        assert_eq!(out.get(0, "source_id"), Some(&Value::Integer(2)));
        assert_eq!(out.get(3, "source_id"), Some(&Value::Integer(3)));
        assert_eq!(out.get(3, "value"), None);
    }

    #[test]
    fn melt_fails_on_missing_value_column() {
        let err = sample()
            .melt(&["iso_code"], &[("gas", Value::Integer(1))], "s", "v")
            .expect_err("missing column");
        assert!(err.to_string().contains("gas"));
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows_with_nulls() {
        let left = TabularDataset::from_rows(
            "countries",
            vec!["iso_code", "name"],
            vec![
                vec![text("BRA"), text("Brazil")],
                vec![text("XKX"), text("Kosovo")],
            ],
        )
        .expect("left");
        let right = TabularDataset::from_rows(
            "pip",
            vec!["iso_code", "region_code"],
            vec![vec![text("BRA"), text("LAC")]],
        )
        .expect("right");
        let joined = left.left_join(&right, &["iso_code"]).expect("join");
        assert_eq!(joined.columns(), ["iso_code", "name", "region_code"]);
        assert_eq!(joined.get(0, "region_code"), Some(&Value::Text("LAC".into())));
        assert_eq!(joined.get(1, "region_code"), None);
    }

    #[test]
    fn left_join_emits_every_match_and_renames_clashes() {
        let left = TabularDataset::from_rows(
            "l",
            vec!["k", "v"],
            vec![vec![int(1), text("a")]],
        )
        .expect("left");
        let right = TabularDataset::from_rows(
            "r",
            vec!["k", "v"],
            vec![vec![int(1), text("x")], vec![int(1), text("y")]],
        )
        .expect("right");
        let joined = left.left_join(&right, &["k"]).expect("join");
        assert_eq!(joined.columns(), ["k", "v", "right_v_1"]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.get(1, "right_v_1"), Some(&Value::Text("y".into())));
    }

    #[test]
    fn group_mean_ignores_nulls_and_keeps_first_appearance_order() {
        let dataset = TabularDataset::from_rows(
            "demo",
            vec!["iso_code", "year", "population"],
            vec![
                vec![text("USA"), int(2020), float(10.0)],
                vec![text("BRA"), int(2020), float(210_000_000.0)],
                vec![text("BRA"), int(2020), float(211_000_000.0)],
                vec![text("USA"), int(2020), None],
            ],
        )
        .expect("dataset");
        let out = dataset
            .group_mean(&["iso_code", "year"], "population")
            .expect("group");
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0, "iso_code"), Some(&Value::Text("USA".into())));
        assert_eq!(out.get(0, "population"), Some(&Value::Float(10.0)));
        assert_eq!(out.get(1, "population"), Some(&Value::Float(210_500_000.0)));
    }

    #[test]
    fn concat_rejects_mismatched_columns() {
        let a = TabularDataset::new("a", vec!["x"]);
        let b = TabularDataset::new("b", vec!["y"]);
        assert!(concat("ab", vec![a, b]).is_err());
    }

    #[test]
    fn truncate_column_stringifies_and_truncates() {
        let dataset = TabularDataset::from_rows(
            "t",
            vec!["code"],
            vec![vec![text("ABCDEFG")], vec![int(123456)], vec![None]],
        )
        .expect("dataset");
        let out = dataset.truncate_column("code", 4).expect("truncate");
        assert_eq!(out.get(0, "code"), Some(&Value::Text("ABCD".into())));
        assert_eq!(out.get(1, "code"), Some(&Value::Text("1234".into())));
        assert_eq!(out.get(2, "code"), None);
    }
}
