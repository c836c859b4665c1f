//! Table detection using text position analysis.
//!
//! Spans are grouped into rows by their quantized top edge. Runs of rows
//! holding more than one span, separated by less than the maximum row gap,
//! form a region; columns are the distinct left edges found in the region.
//! Text positioning is the only input: ruling lines never create a table.

use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::model::{ClassifiedElement, ElementKind, Point, TableCell, TableRegion};
use crate::units::CoordinateMapper;

/// Table detector configuration.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Quantization step for row grouping, native units
    pub row_quantum: f32,
    /// Consecutive rows further apart than this close the region
    pub max_row_gap: f32,
    /// Column match tolerance, native units
    pub column_tolerance: f32,
    /// Minimum number of rows to consider as table
    pub min_rows: usize,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for TableDetectorConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            row_quantum: config.table_row_quantum,
            max_row_gap: config.table_row_gap_max,
            column_tolerance: config.table_column_tolerance,
            min_rows: 2,
        }
    }
}

/// A row of spans sharing a quantized top edge.
#[derive(Debug, Clone)]
struct Row {
    y: f32,
    /// Indices into the input, sorted by x
    spans: Vec<usize>,
}

/// Detects tables in the text spans of a page.
pub struct TableDetector {
    config: TableDetectorConfig,
    mapper: CoordinateMapper,
}

impl TableDetector {
    /// Create a new table detector with default configuration.
    pub fn new() -> Self {
        Self::with_config(TableDetectorConfig::default(), CoordinateMapper::default())
    }

    /// Create a new table detector with custom configuration.
    pub fn with_config(config: TableDetectorConfig, mapper: CoordinateMapper) -> Self {
        Self { config, mapper }
    }

    /// Detect tables among `spans`.
    ///
    /// Returns the table elements and the spans that were not consumed by a
    /// table. Elements other than text spans pass through untouched. On
    /// error the caller keeps its spans and gets no tables.
    pub fn detect(
        &self,
        page: u32,
        spans: Vec<ClassifiedElement>,
    ) -> Result<(Vec<ClassifiedElement>, Vec<ClassifiedElement>)> {
        let rows = self.group_into_rows(&spans)?;
        log::debug!("TableDetector: page {} grouped into {} rows", page, rows.len());

        let regions = self.find_regions(&rows);
        if regions.is_empty() {
            return Ok((Vec::new(), spans));
        }

        let mut consumed = vec![false; spans.len()];
        let mut tables = Vec::with_capacity(regions.len());
        for region in &regions {
            let table = self.build_table(page, &spans, region, &mut consumed)?;
            tables.push(table);
        }

        let remaining = spans
            .into_iter()
            .zip(consumed)
            .filter_map(|(span, used)| (!used).then_some(span))
            .collect();

        log::debug!("TableDetector: page {} found {} tables", page, tables.len());
        Ok((tables, remaining))
    }

    fn quantize(&self, value: f32) -> Result<i64> {
        if !value.is_finite() {
            return Err(Error::Classification(format!(
                "non-finite span coordinate {}",
                value
            )));
        }
        Ok((value / self.config.row_quantum).round() as i64)
    }

    /// Group spans into rows by rounded top edge, top to bottom.
    fn group_into_rows(&self, spans: &[ClassifiedElement]) -> Result<Vec<Row>> {
        let quantum = self.config.row_quantum;
        if !quantum.is_finite() || quantum <= 0.0 {
            return Err(Error::Classification(format!(
                "invalid row quantum {}",
                self.config.row_quantum
            )));
        }

        let mut rows: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (index, span) in spans.iter().enumerate() {
            if !span.is_text() {
                continue;
            }
            if !span.bbox.is_finite() {
                return Err(Error::Classification(format!(
                    "span at {:?} has non-finite geometry",
                    span.bbox
                )));
            }
            let key = self.quantize(span.bbox.y0)?;
            rows.entry(key).or_default().push(index);
        }

        Ok(rows
            .into_iter()
            .map(|(key, mut members)| {
                members.sort_by(|&a, &b| spans[a].bbox.x0.total_cmp(&spans[b].bbox.x0));
                Row {
                    y: key as f32 * self.config.row_quantum,
                    spans: members,
                }
            })
            .collect())
    }

    /// Merge consecutive multi-span rows into candidate regions.
    fn find_regions(&self, rows: &[Row]) -> Vec<Vec<Row>> {
        let mut regions = Vec::new();
        let mut current: Vec<Row> = Vec::new();

        for row in rows {
            let gap_ok = current
                .last()
                .map_or(true, |prev| row.y - prev.y < self.config.max_row_gap);

            if row.spans.len() > 1 && gap_ok {
                current.push(row.clone());
                continue;
            }

            self.close_region(&mut current, &mut regions);
            if row.spans.len() > 1 {
                current.push(row.clone());
            }
        }
        self.close_region(&mut current, &mut regions);
        regions
    }

    fn close_region(&self, current: &mut Vec<Row>, regions: &mut Vec<Vec<Row>>) {
        if current.len() >= self.config.min_rows {
            regions.push(std::mem::take(current));
        } else {
            current.clear();
        }
    }

    fn build_table(
        &self,
        page: u32,
        spans: &[ClassifiedElement],
        rows: &[Row],
        consumed: &mut [bool],
    ) -> Result<ClassifiedElement> {
        let quantum = self.config.row_quantum;
        let tolerance = self.config.column_tolerance;

        let mut column_keys: Vec<i64> = Vec::new();
        for row in rows {
            for &i in &row.spans {
                column_keys.push(self.quantize(spans[i].bbox.x0)?);
            }
        }
        column_keys.sort_unstable();
        column_keys.dedup();
        let columns: Vec<f32> = column_keys.iter().map(|&k| k as f32 * quantum).collect();

        let mut cells = Vec::with_capacity(rows.len());
        let mut members = Vec::new();
        for row in rows {
            let mut line: Vec<TableCell> = vec![TableCell::empty(); columns.len()];
            let mut assigned = vec![false; row.spans.len()];

            for (col, &x) in columns.iter().enumerate() {
                let hit = row
                    .spans
                    .iter()
                    .enumerate()
                    .find(|&(k, &i)| !assigned[k] && (spans[i].bbox.x0 - x).abs() <= tolerance);
                if let Some((k, &i)) = hit {
                    assigned[k] = true;
                    line[col] = cell_for(&spans[i]);
                }
            }

            // A span can lose its column to an earlier span in the same row;
            // it joins the nearest column so that every span lands in one cell.
            for (k, &i) in row.spans.iter().enumerate() {
                if assigned[k] {
                    continue;
                }
                let x = spans[i].bbox.x0;
                let nearest = columns
                    .iter()
                    .enumerate()
                    .min_by(|a, b| (a.1 - x).abs().total_cmp(&(b.1 - x).abs()))
                    .map(|(col, _)| col);
                if let Some(col) = nearest {
                    append_to_cell(&mut line[col], &spans[i]);
                }
            }

            members.extend(row.spans.iter().copied());
            cells.push(line);
        }

        let bbox = members
            .iter()
            .map(|&i| spans[i].bbox)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();
        for &i in &members {
            consumed[i] = true;
        }

        let style = members
            .first()
            .map(|&i| spans[i].style.clone())
            .unwrap_or_default();

        let region = TableRegion {
            bbox,
            rows: rows.iter().map(|r| r.y).collect(),
            columns,
            cells,
            // Always true: the first row is assumed to be a header.
            has_header: true,
        };

        Ok(ClassifiedElement {
            page,
            bbox,
            pixel_bbox: self.mapper.rect_to_markup(&bbox)?,
            style,
            kind: ElementKind::TableRegion(region),
        })
    }
}

impl Default for TableDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn cell_for(span: &ClassifiedElement) -> TableCell {
    TableCell::new(
        span.text().unwrap_or_default(),
        Point::new(span.bbox.x0, span.bbox.y0),
        span.style.font_size,
    )
}

fn append_to_cell(cell: &mut TableCell, span: &ClassifiedElement) {
    let text = span.text().unwrap_or_default();
    if cell.is_empty() {
        *cell = cell_for(span);
    } else {
        cell.text.push(' ');
        cell.text.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Rect, StyleRecord};

    fn span(text: &str, x: f32, y: f32) -> ClassifiedElement {
        let bbox = Rect::new(x, y, x + 30.0, y + 12.0);
        ClassifiedElement {
            page: 1,
            bbox,
            pixel_bbox: bbox,
            style: StyleRecord {
                font_size: 10.0,
                ..StyleRecord::default()
            },
            kind: ElementKind::TextSpan {
                text: text.to_string(),
                origin: Point::new(x, y + 10.0),
            },
        }
    }

    fn grid(rows: &[f32], xs: &[f32]) -> Vec<ClassifiedElement> {
        let mut spans = Vec::new();
        for (r, &y) in rows.iter().enumerate() {
            for (c, &x) in xs.iter().enumerate() {
                spans.push(span(&format!("r{}c{}", r, c), x, y));
            }
        }
        spans
    }

    fn table_of(element: &ClassifiedElement) -> &TableRegion {
        match &element.kind {
            ElementKind::TableRegion(t) => t,
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn test_two_rows_three_columns() {
        let detector = TableDetector::new();
        let (tables, remaining) = detector.detect(1, grid(&[100.0, 120.0], &[10.0, 50.0, 90.0])).unwrap();
        assert_eq!(tables.len(), 1);
        assert!(remaining.is_empty());
        let table = table_of(&tables[0]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 3);
        assert!(table.has_header);
        assert_eq!(table.cell(1, 2).unwrap().text, "r1c2");
        assert_eq!(table.cell(0, 0).unwrap().anchor, Some(Point::new(10.0, 100.0)));
    }

    #[test]
    fn test_single_row_is_not_a_table() {
        let detector = TableDetector::new();
        let spans = grid(&[100.0], &[10.0, 50.0, 90.0]);
        let (tables, remaining) = detector.detect(1, spans).unwrap();
        assert!(tables.is_empty());
        assert_eq!(remaining.len(), 3);
    }

    #[test]
    fn test_large_gap_splits_regions() {
        let detector = TableDetector::new();
        let spans = grid(&[100.0, 120.0, 200.0], &[10.0, 50.0]);
        let (tables, remaining) = detector.detect(1, spans).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(table_of(&tables[0]).row_count(), 2);
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn test_single_span_row_closes_region() {
        let detector = TableDetector::new();
        let mut spans = grid(&[100.0, 110.0], &[10.0, 50.0]);
        spans.push(span("heading", 10.0, 120.0));
        spans.extend(grid(&[130.0], &[10.0, 50.0]));
        let (tables, remaining) = detector.detect(1, spans).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(table_of(&tables[0]).rows, vec![100.0, 110.0]);
        assert_eq!(remaining.len(), 3);
    }

    #[test]
    fn test_partition_with_missing_and_crowded_columns() {
        let detector = TableDetector::new();
        let mut spans = grid(&[100.0], &[10.0, 50.0, 90.0]);
        spans.push(span("a", 10.0, 120.0));
        spans.push(span("b", 12.0, 120.0));
        let (tables, remaining) = detector.detect(1, spans).unwrap();
        assert!(remaining.is_empty());
        let table = table_of(&tables[0]);
        // x=12 is its own column; both spans of the second row fit within
        // tolerance of x=10 and x=12.
        assert_eq!(table.column_count(), 4);
        let texts: Vec<&str> = table.cells[1].iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "", ""]);
        assert_eq!(table.filled_cells(), 5);
    }

    #[test]
    fn test_non_finite_span_fails() {
        let detector = TableDetector::new();
        let mut spans = grid(&[100.0, 120.0], &[10.0, 50.0]);
        spans[0].bbox.y0 = f32::NAN;
        assert!(detector.detect(1, spans).is_err());
    }
}
