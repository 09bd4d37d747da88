use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::engine::GridCell;
use crate::model::{
    CostShareKey, CostShareType, CoverageType, Edit, IntervalType, LimitFieldValue, TierIndex,
    UnitType, ValueField,
};

/// Errors that can occur when reading edit scripts
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open edit script: {0}")]
    Open(csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    Missing {
        line: usize,
        op: &'static str,
        field: &'static str,
    },

    #[error("line {line}: invalid {field} '{value}': {reason}")]
    InvalidValue {
        line: usize,
        field: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    class: String,
    benefit: Option<String>,
    target: Option<String>,
    tier: Option<TierIndex>,
    coverage: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    class: &'a str,
    benefit: &'a str,
    tier: TierIndex,
    coverage: CoverageType,
    source: &'static str,
    r#type: &'static str,
    copay: String,
    coinsurance: String,
}

/// Field accessors for one row, reporting the line and op on failure.
struct Row {
    line: usize,
    op: &'static str,
    inner: InputRow,
}

impl Row {
    fn required(
        field: &'static str,
        value: Option<String>,
        line: usize,
        op: &'static str,
    ) -> Result<String, CsvError> {
        value
            .filter(|v| !v.is_empty())
            .ok_or(CsvError::Missing { line, op, field })
    }

    fn benefit(&mut self) -> Result<String, CsvError> {
        Self::required("benefit", self.inner.benefit.take(), self.line, self.op)
    }

    fn target(&mut self) -> Result<String, CsvError> {
        Self::required("target", self.inner.target.take(), self.line, self.op)
    }

    fn value(&mut self) -> Result<String, CsvError> {
        Self::required("value", self.inner.value.take(), self.line, self.op)
    }

    fn parsed<T>(&mut self) -> Result<T, CsvError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let line = self.line;
        let value = self.value()?;
        value.parse().map_err(|e: T::Err| CsvError::InvalidValue {
            line,
            field: "value",
            reason: e.to_string(),
            value,
        })
    }

    /// Cost-share cell; an empty benefit column addresses the class default.
    fn key(&mut self) -> Result<CostShareKey, CsvError> {
        let (line, op) = (self.line, self.op);
        let tier = self.inner.tier.ok_or(CsvError::Missing {
            line,
            op,
            field: "tier",
        })?;
        let coverage = Self::required("coverage", self.inner.coverage.take(), line, op)?;
        let coverage = coverage
            .parse::<CoverageType>()
            .map_err(|e| CsvError::InvalidValue {
                line,
                field: "coverage",
                reason: e.to_string(),
                value: coverage.clone(),
            })?;
        Ok(CostShareKey {
            class: self.inner.class.clone(),
            benefit: self.inner.benefit.take().filter(|b| !b.is_empty()),
            tier,
            coverage,
        })
    }

    fn limit(&mut self, value: LimitFieldValue) -> Result<Edit, CsvError> {
        Ok(Edit::SetLimitField {
            class: self.inner.class.clone(),
            benefit: self.benefit()?,
            value,
        })
    }

    fn cost_share_value(&mut self, field: ValueField) -> Result<Edit, CsvError> {
        let key = self.key()?;
        Ok(Edit::SetCostShareValue {
            key,
            field,
            value: self.parsed::<Amount>()?,
        })
    }

    fn into_edit(mut self) -> Result<Edit, CsvError> {
        let class = self.inner.class.clone();
        match self.op {
            "move" => Ok(Edit::MoveBenefit {
                benefit: self.benefit()?,
                from: class,
                to: self.target()?,
            }),
            "reorder" => Ok(Edit::ReorderWithinClass {
                benefit: self.benefit()?,
                class,
                before: self.inner.target.take().filter(|t| !t.is_empty()),
            }),
            "cost_share_type" => {
                let key = self.key()?;
                Ok(Edit::SetCostShareType {
                    key,
                    cost_share_type: self.parsed::<CostShareType>()?,
                })
            }
            "copay" => self.cost_share_value(ValueField::CopayAmount),
            "coinsurance" => self.cost_share_value(ValueField::CoinsurancePercentage),
            "quantity" => {
                let quantity = self.parsed::<i64>()?;
                self.limit(LimitFieldValue::Quantity(quantity))
            }
            "unit" => {
                let unit = self.parsed::<UnitType>()?;
                self.limit(LimitFieldValue::Unit(unit))
            }
            "interval_type" => {
                let kind = self.parsed::<IntervalType>()?;
                self.limit(LimitFieldValue::IntervalType(kind))
            }
            "interval_value" => {
                let value = self.parsed::<i64>()?;
                self.limit(LimitFieldValue::IntervalValue(value))
            }
            "add_benefit" => Ok(Edit::AddBenefit {
                benefit: self.benefit()?,
                class,
            }),
            "remove_benefit" => Ok(Edit::RemoveBenefit {
                benefit: self.benefit()?,
                class,
            }),
            "add_class" => Ok(Edit::AddClass {
                name: self.value()?,
                class,
            }),
            "rename_class" => Ok(Edit::RenameClass {
                name: self.value()?,
                class,
            }),
            "remove_class" => Ok(Edit::RemoveClass { class }),
            other => Err(CsvError::UnrecognizedOp {
                line: self.line,
                op: other.to_string(),
            }),
        }
    }
}

const OPS: &[&str] = &[
    "move",
    "reorder",
    "cost_share_type",
    "copay",
    "coinsurance",
    "quantity",
    "unit",
    "interval_type",
    "interval_value",
    "add_benefit",
    "remove_benefit",
    "add_class",
    "rename_class",
    "remove_class",
];

/// Read edits from a csv edit script
pub fn read_edits(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Edit, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let op = OPS
                .iter()
                .copied()
                .find(|op| *op == row.op)
                .ok_or_else(|| CsvError::UnrecognizedOp {
                    line,
                    op: row.op.clone(),
                })?;
            Row {
                line,
                op,
                inner: row,
            }
            .into_edit()
        }))
}

/// Write the resolved cost-share grid in csv format
pub fn write_grid<'a>(
    writer: impl io::Write,
    cells: impl IntoIterator<Item = GridCell<'a>>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for cell in cells {
        let cost_share = cell.cost_share();
        let value = |field| {
            cost_share
                .and_then(|cs| cs.values.get(field))
                .map(|amount| amount.to_string())
                .unwrap_or_default()
        };
        let row = OutputRow {
            class: &cell.class.id,
            benefit: &cell.benefit.id,
            tier: cell.tier,
            coverage: cell.coverage,
            source: cell.resolution.source(),
            r#type: cost_share.map(|cs| cs.cost_share_type.as_str()).unwrap_or(""),
            copay: value(ValueField::CopayAmount),
            coinsurance: value(ValueField::CoinsurancePercentage),
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;
    use crate::document::fixtures::bundle;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "op,class,benefit,target,tier,coverage,value\n";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn read(content: &str) -> Vec<Result<Edit, CsvError>> {
        let file = write_csv(content);
        read_edits(file.path()).unwrap().collect()
    }

    #[test]
    fn read_move_and_reorder() {
        let results = read("move,c1,b1,c2,,,\nreorder,c1,b2,b1,,,\nreorder,c1,b2,,,,\n");
        let edits: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            edits,
            [
                Edit::MoveBenefit {
                    benefit: "b1".into(),
                    from: "c1".into(),
                    to: "c2".into(),
                },
                Edit::ReorderWithinClass {
                    class: "c1".into(),
                    benefit: "b2".into(),
                    before: Some("b1".into()),
                },
                Edit::ReorderWithinClass {
                    class: "c1".into(),
                    benefit: "b2".into(),
                    before: None,
                },
            ]
        );
    }

    #[test]
    fn read_cost_share_rows() {
        let results = read("cost_share_type,c1,,,0,adult,Copay\ncopay,c1,b1,,1,Child,12.5\n");
        let edits: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            edits[0],
            Edit::SetCostShareType {
                key: CostShareKey::class_default("c1", 0, CoverageType::Adult),
                cost_share_type: CostShareType::Copay,
            }
        );
        assert_eq!(
            edits[1],
            Edit::SetCostShareValue {
                key: CostShareKey::benefit("c1", "b1", 1, CoverageType::Child),
                field: ValueField::CopayAmount,
                value: Amount::from_scaled(125_000),
            }
        );
    }

    #[test]
    fn read_limit_and_structure_rows() {
        let results = read(
            "quantity,c1,b1,,,,-1\nunit,c1,b1,,,,N/A\ninterval_type,c1,b1,,,,PerLifetime\n\
             add_class,c3,,,,,Class 3\nremove_class,c3,,,,,\n",
        );
        let edits: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        // negative quantities reach the engine, which rejects them
        assert!(matches!(
            edits[0],
            Edit::SetLimitField {
                value: LimitFieldValue::Quantity(-1),
                ..
            }
        ));
        assert!(matches!(
            edits[1],
            Edit::SetLimitField {
                value: LimitFieldValue::Unit(UnitType::NotApplicable),
                ..
            }
        ));
        assert!(matches!(&edits[3], Edit::AddClass { name, .. } if name == "Class 3"));
        assert_eq!(edits[4], Edit::RemoveClass { class: "c3".into() });
    }

    #[test]
    fn read_with_whitespace() {
        let results = read("move , c1 , b1 , c2 , , ,\n");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_reports_line_numbers() {
        let results = read("move,c1,b1,c2,,,\nexplode,c1,,,,,\nmove,c1,,c2,,,\ncopay,c1,b1,,x,Adult,5\n");
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].as_ref().unwrap_err(),
            CsvError::UnrecognizedOp { line: 3, .. }
        ));
        assert!(matches!(
            results[2].as_ref().unwrap_err(),
            CsvError::Missing {
                line: 4,
                field: "benefit",
                ..
            }
        ));
        assert!(matches!(
            results[3].as_ref().unwrap_err(),
            CsvError::Parse { line: 5, .. }
        ));
    }

    #[test]
    fn read_rejects_bad_values() {
        let results = read("copay,c1,b1,,0,Adult,lots\ncost_share_type,c1,b1,,0,Senior,Copay\n");
        assert!(matches!(
            results[0].as_ref().unwrap_err(),
            CsvError::InvalidValue { field: "value", .. }
        ));
        assert!(matches!(
            results[1].as_ref().unwrap_err(),
            CsvError::InvalidValue {
                field: "coverage",
                ..
            }
        ));
    }

    #[test]
    fn read_rejects_non_finite_amounts() {
        let results = read("copay,c2,,,0,Adult,NaN\ncoinsurance,c2,,,0,Adult,inf\ncopay,c2,,,0,Adult,1e20\n");
        for (result, value) in results.iter().zip(["NaN", "inf", "1e20"]) {
            assert!(matches!(
                result.as_ref().unwrap_err(),
                CsvError::InvalidValue { field: "value", value: v, .. } if v == value
            ));
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            read_edits("/nonexistent/edits.csv"),
            Err(CsvError::Open(_))
        ));
    }

    #[test]
    fn write_grid_rows() {
        let mut engine = Engine::load(&bundle(), Default::default());
        engine
            .set_cost_share_type("c1", None, 0, CoverageType::Adult, CostShareType::Copay)
            .unwrap();
        engine
            .set_cost_share_value(
                "c1",
                None,
                0,
                CoverageType::Adult,
                ValueField::CopayAmount,
                Amount::whole(10),
            )
            .unwrap();

        let mut out = Vec::new();
        write_grid(&mut out, engine.grid()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "class,benefit,tier,coverage,source,type,copay,coinsurance");
        assert_eq!(lines[1], "c1,b1,0,Adult,class,Copay,10.00,");
        assert_eq!(lines[2], "c1,b1,0,Child,none,,,");
        // 3 benefits x 2 tiers x 2 coverages plus header
        assert_eq!(lines.len(), 13);
    }
}
