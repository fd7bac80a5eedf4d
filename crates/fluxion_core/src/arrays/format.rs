use std::fmt::Write as _;

use fluxion_error::Result;

use super::coltype::ColType;
use super::table::ColumnTable;

/// Options for the text table formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Print the header again after this many rows. Zero never repeats.
    pub repeat_header_count: usize,
}

fn min_width(typ: ColType) -> usize {
    match typ {
        ColType::Bool => 12,
        ColType::Int => 26,
        ColType::UInt => 27,
        ColType::Float => 28,
        ColType::String => 22,
        ColType::Time => 30,
    }
}

/// Render a table as aligned text.
///
/// Group key columns are printed first in key order, remaining columns
/// follow in table order.
pub fn format_table(table: &ColumnTable, opts: FormatOptions) -> Result<String> {
    let key = table.key();
    let mut order: Vec<usize> = key
        .cols()
        .iter()
        .filter_map(|c| table.col_idx(&c.label))
        .collect();
    let rest: Vec<usize> = (0..table.cols().len())
        .filter(|j| !order.contains(j))
        .collect();
    order.extend(rest);

    let mut out = String::new();
    let labels: Vec<&str> = key.cols().iter().map(|c| c.label.as_str()).collect();
    writeln!(out, "Table: keys: [{}]", labels.join(", "))?;

    table.do_columns(|cr| {
        let headers: Vec<String> = order
            .iter()
            .map(|&j| format!("{}:{}", cr.cols()[j].label, cr.cols()[j].typ))
            .collect();

        let mut rows = Vec::with_capacity(cr.len());
        for i in 0..cr.len() {
            let row = order
                .iter()
                .map(|&j| cr.value(i, j).map(|v| v.to_string()))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }

        let widths: Vec<usize> = order
            .iter()
            .enumerate()
            .map(|(oj, &j)| {
                let data = rows.iter().map(|r| r[oj].len()).max().unwrap_or(0);
                headers[oj]
                    .len()
                    .max(min_width(cr.cols()[j].typ))
                    .max(data)
            })
            .collect();

        let write_header = |out: &mut String| -> Result<()> {
            for (oj, h) in headers.iter().enumerate() {
                write!(out, "{:>width$}  ", h, width = widths[oj])?;
            }
            writeln!(out)?;
            Ok(())
        };
        let write_separator = |out: &mut String| -> Result<()> {
            for w in &widths {
                write!(out, "{}  ", "-".repeat(*w))?;
            }
            writeln!(out)?;
            Ok(())
        };

        write_header(&mut out)?;
        write_separator(&mut out)?;
        for (i, row) in rows.iter().enumerate() {
            for (oj, v) in row.iter().enumerate() {
                write!(out, "{:>width$}  ", v, width = widths[oj])?;
            }
            writeln!(out)?;
            if opts.repeat_header_count > 0 && (i + 1) % opts.repeat_header_count == 0 {
                write_separator(&mut out)?;
                write_header(&mut out)?;
                write_separator(&mut out)?;
            }
        }
        Ok(())
    })?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::arrays::allocator::Allocator;
    use crate::arrays::builder::TableBuilder;
    use crate::arrays::coltype::ColMeta;
    use crate::arrays::group_key::GroupKeyBuilder;
    use crate::arrays::util::append_key_values;

    #[test]
    fn key_columns_first() {
        let alloc = Arc::new(Allocator::new());
        let mut kb = GroupKeyBuilder::new();
        kb.add_key_value("host", "a").unwrap();
        let key = kb.build().unwrap();

        let mut b = TableBuilder::new(key.clone(), &alloc);
        let v = b.add_col(ColMeta::new("_value", ColType::Float)).unwrap();
        b.add_col(ColMeta::new("host", ColType::String)).unwrap();
        b.append_floats(v, &[1.5, 2.0]).unwrap();
        append_key_values(&key, &mut b, 2).unwrap();
        let table = b.table().unwrap();

        let out = format_table(&table, FormatOptions::default()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!("Table: keys: [host]", lines[0]);
        assert!(lines[1].trim_start().starts_with("host:string"));
        assert!(lines[1].contains("_value:float"));
        assert_eq!(5, lines.len());
        assert!(lines[3].ends_with("1.5  "));
    }
}
