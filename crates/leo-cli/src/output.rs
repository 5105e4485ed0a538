use leo_core::gate::GateRecord;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// One line per gate, then its issues indented.
pub fn print_gates(records: &[GateRecord]) {
    let rows = records
        .iter()
        .map(|r| {
            let verdict = if r.result.is_skipped() {
                "skip"
            } else if r.result.passed {
                "pass"
            } else {
                "FAIL"
            };
            vec![
                r.name.clone(),
                verdict.to_string(),
                format!("{}/{}", r.result.score, r.result.max_score),
                if r.required { "" } else { "advisory" }.to_string(),
            ]
        })
        .collect();
    print_table(&["GATE", "RESULT", "SCORE", ""], rows);
    for r in records.iter().filter(|r| !r.result.issues.is_empty()) {
        println!("\n{}:", r.name);
        for issue in &r.result.issues {
            println!("  - {issue}");
        }
    }
}
