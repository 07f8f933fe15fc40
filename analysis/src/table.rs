use crate::dataset::Dataset;
use itertools::Itertools;

pub const TABLE_FILE: &str = "benchmarks_table.md";

const HEADER: &str = "| Function | OPS | Min Time (s) | Max Time (s) | Mean Time (s) | Std Dev |\n\
                      |:---------|----:|-------------:|-------------:|--------------:|--------:|\n";

/// `{:.2e}` with a signed, two digit exponent: `1.23e-05`, `0.00e+00`
fn scientific(value: f64) -> String {
    let formatted = format!("{value:.2e}");

    match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exponent) => format!(
                "{mantissa}e{}{:02}",
                if exponent < 0 { '-' } else { '+' },
                exponent.abs()
            ),
            Err(_) => formatted,
        },
        // inf and NaN carry no exponent
        None => formatted,
    }
}

/// Markdown summary with one section per input size, fastest function first
pub fn render_table(dataset: &Dataset) -> String {
    let mut output = String::from("# Benchmark Results\n\n");

    let records = dataset
        .records
        .iter()
        .sorted_by(|left, right| {
            left.size
                .cmp(&right.size)
                .then_with(|| right.stats.ops.total_cmp(&left.stats.ops))
        })
        .collect_vec();

    for (size, group) in &records.into_iter().group_by(|record| record.size) {
        output.push_str(&format!("### Elements: {size}\n\n"));
        output.push_str(HEADER);

        for record in group {
            let stats = &record.stats;

            output.push_str(&format!(
                "| {} | {:.2} | {} | {} | {} | {} |\n",
                record.function,
                stats.ops,
                scientific(stats.min),
                scientific(stats.max),
                scientific(stats.mean),
                scientific(stats.stddev)
            ));
        }

        output.push('\n');
    }

    output
}
