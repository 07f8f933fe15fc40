use crate::{
    dataset::{Dataset, Metric},
    smoothing::savgol,
    table,
};
use itertools::Itertools;
use plotters::{coord::Shift, prelude::*};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::Display,
    fs,
    ops::Range,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to render chart: {0}")]
    Render(String),
    #[error("Image format {0} not supported, use png or svg")]
    UnknownFormat(String),
}

fn render_error<E: Display>(error: E) -> PlotError {
    PlotError::Render(error.to_string())
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = PlotError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            other => Err(PlotError::UnknownFormat(other.to_owned())),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PlotOptions {
    // charts land in `<output>/<variant>/`
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub format: ImageFormat,
    // function label fragment every other function is compared against
    #[serde(default = "default_baseline")]
    pub baseline: String,
    // sizes strictly above this count as large inputs
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u64,
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    #[serde(default = "default_smoothing_order")]
    pub smoothing_order: usize,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_table")]
    pub table: bool,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: ImageFormat::default(),
            baseline: default_baseline(),
            large_threshold: default_large_threshold(),
            smoothing_window: default_smoothing_window(),
            smoothing_order: default_smoothing_order(),
            width: default_width(),
            height: default_height(),
            table: default_table(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("docs/assets")
}

fn default_baseline() -> String {
    "Purem".to_owned()
}

fn default_large_threshold() -> u64 {
    100_000
}

fn default_smoothing_window() -> usize {
    5
}

fn default_smoothing_order() -> usize {
    2
}

fn default_width() -> u32 {
    1400
}

fn default_height() -> u32 {
    800
}

fn default_table() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Log,
    Linear,
}

impl Axis {
    /// map a data value into chart coordinates, log axes drop non-positive values
    pub fn transform(self, value: f64) -> Option<f64> {
        match self {
            Self::Log if value > 0.0 => Some(value.log10()),
            Self::Log => None,
            Self::Linear => Some(value).filter(|value| value.is_finite()),
        }
    }

    fn label(self, coordinate: f64) -> String {
        match self {
            Self::Log => format!("{:.0e}", 10f64.powf(coordinate)),
            Self::Linear => format!("{coordinate:.2}"),
        }
    }

    fn fallback(self) -> Range<f64> {
        match self {
            Self::Log => -1.0..1.0,
            Self::Linear => 0.0..1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    /// (size, value) in data space
    pub points: Vec<(f64, f64)>,
}

/// Everything needed to draw one chart, independent of the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub file_stem: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub y_axis: Axis,
    pub series: Vec<Series>,
    /// horizontal reference line and its legend entry
    pub reference: Option<(f64, String)>,
}

impl Chart {
    fn projected(&self) -> Vec<(&str, Vec<(f64, f64)>)> {
        self.series
            .iter()
            .map(|series| {
                let points = series
                    .points
                    .iter()
                    .filter_map(|&(x, y)| Some((Axis::Log.transform(x)?, self.y_axis.transform(y)?)))
                    .collect_vec();

                if points.len() < series.points.len() {
                    debug!(
                        chart = self.file_stem.as_str(),
                        series = series.label.as_str(),
                        "Dropped {} points outside the axis domain",
                        series.points.len() - points.len()
                    );
                }

                (series.label.as_str(), points)
            })
            .collect_vec()
    }
}

fn padded(values: impl Iterator<Item = f64>, fallback: Range<f64>) -> Range<f64> {
    match values.minmax().into_option() {
        None => fallback,
        Some((min, max)) if (max - min).abs() < f64::EPSILON => min - 0.5..max + 0.5,
        Some((min, max)) => {
            let margin = (max - min) * 0.05;
            min - margin..max + margin
        }
    }
}

/// `metric` per function over the input size
pub fn metric_chart(dataset: &Dataset, metric: Metric, large_threshold: Option<u64>) -> Chart {
    let (suffix, title, x_label) = match large_threshold {
        Some(threshold) => (
            "large",
            "Large Inputs Only",
            format!("Input Size (>{threshold})"),
        ),
        None => ("full", "Full Range", "Input Size".to_owned()),
    };

    Chart {
        file_stem: format!("benchmark_{metric}_{suffix}"),
        title: format!("{} vs Size ({title})", metric.name().to_uppercase()),
        x_label,
        y_label: metric.name().to_owned(),
        y_axis: if metric.log_scale() {
            Axis::Log
        } else {
            Axis::Linear
        },
        series: dataset
            .functions()
            .into_iter()
            .map(|function| Series {
                label: function.to_owned(),
                points: dataset
                    .series(function, large_threshold)
                    .into_iter()
                    .map(|record| (record.size as f64, metric.value(&record.stats)))
                    .collect_vec(),
            })
            .filter(|series| !series.points.is_empty())
            .collect_vec(),
        reference: None,
    }
}

/// Throughput of the baseline relative to every other function, on shared sizes
pub fn acceleration_chart(dataset: &Dataset, options: &PlotOptions) -> Chart {
    let functions = dataset.functions();
    let baseline = functions
        .iter()
        .find(|function| function.contains(options.baseline.as_str()))
        .copied();

    let series = match baseline {
        None => {
            warn!(
                baseline = %options.baseline,
                "Baseline is missing from the run, acceleration chart stays empty"
            );

            Vec::new()
        }
        Some(baseline) => {
            let ops_by_size = |function: &str| {
                dataset
                    .series(function, None)
                    .into_iter()
                    .map(|record| (record.size, record.stats.ops))
                    .collect::<BTreeMap<_, _>>()
            };
            let baseline_ops = ops_by_size(baseline);

            functions
                .iter()
                .copied()
                .filter(|function| !function.contains(options.baseline.as_str()))
                .filter_map(|function| {
                    let (sizes, ratios): (Vec<f64>, Vec<f64>) = ops_by_size(function)
                        .into_iter()
                        .filter(|&(_, ops)| ops > 0.0)
                        .filter_map(|(size, ops)| {
                            baseline_ops.get(&size).map(|base| (size as f64, base / ops))
                        })
                        .unzip();

                    if sizes.is_empty() {
                        return None;
                    }

                    let ratios = if ratios.len() >= options.smoothing_window {
                        savgol(&ratios, options.smoothing_window, options.smoothing_order)
                            .unwrap_or_else(|error| {
                                warn!("Smoothing skipped: {error}");
                                ratios
                            })
                    } else {
                        ratios
                    };

                    Some(Series {
                        label: format!("{} vs {function}", options.baseline),
                        points: sizes.into_iter().zip(ratios).collect_vec(),
                    })
                })
                .collect_vec()
        }
    };

    Chart {
        file_stem: "benchmark_acceleration_large".to_owned(),
        title: format!(
            "{} Acceleration Relative to Other Libraries",
            options.baseline
        ),
        x_label: "Input Size".to_owned(),
        y_label: format!("Acceleration ({} / Other)", options.baseline),
        y_axis: Axis::Log,
        series,
        reference: Some((1.0, "Equal Performance (x1)".to_owned())),
    }
}

/// Relative run-to-run deviation (stddev / mean) in percent
pub fn stability_chart(dataset: &Dataset) -> Chart {
    Chart {
        file_stem: "benchmark_stability".to_owned(),
        title: "Relative Deviation vs Size".to_owned(),
        x_label: "Input Size".to_owned(),
        y_label: "Std Dev / Mean (%)".to_owned(),
        y_axis: Axis::Linear,
        series: dataset
            .functions()
            .into_iter()
            .map(|function| Series {
                label: function.to_owned(),
                points: dataset
                    .series(function, None)
                    .into_iter()
                    .filter(|record| record.stats.mean > 0.0)
                    .map(|record| {
                        (
                            record.size as f64,
                            100.0 * record.stats.stddev / record.stats.mean,
                        )
                    })
                    .collect_vec(),
            })
            .filter(|series| !series.points.is_empty())
            .collect_vec(),
        reference: None,
    }
}

/// all charts of a report in a stable order
pub fn charts(dataset: &Dataset, options: &PlotOptions) -> Vec<Chart> {
    Metric::ALL
        .into_iter()
        .flat_map(|metric| {
            [
                metric_chart(dataset, metric, None),
                metric_chart(dataset, metric, Some(options.large_threshold)),
            ]
        })
        .chain([acceleration_chart(dataset, options), stability_chart(dataset)])
        .collect_vec()
}

fn draw<DB: DrawingBackend>(root: DrawingArea<DB, Shift>, chart: &Chart) -> Result<(), PlotError> {
    let series = chart.projected();
    let reference = chart
        .reference
        .as_ref()
        .and_then(|(value, label)| Some((chart.y_axis.transform(*value)?, label.as_str())));

    let x_range = padded(
        series.iter().flat_map(|(_, points)| points.iter().map(|point| point.0)),
        4.0..7.0,
    );
    let y_range = padded(
        series
            .iter()
            .flat_map(|(_, points)| points.iter().map(|point| point.1))
            .chain(reference.map(|(value, _)| value)),
        chart.y_axis.fallback(),
    );
    let y_axis = chart.y_axis;

    root.fill(&WHITE).map_err(render_error)?;

    let mut context = ChartBuilder::on(&root)
        .caption(&chart.title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range.clone(), y_range)
        .map_err(render_error)?;

    context
        .configure_mesh()
        .x_desc(chart.x_label.as_str())
        .y_desc(chart.y_label.as_str())
        .x_label_formatter(&|value| Axis::Log.label(*value))
        .y_label_formatter(&|value| y_axis.label(*value))
        .draw()
        .map_err(render_error)?;

    for (index, (label, points)) in series.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();

        context
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(render_error)?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        context
            .draw_series(points.iter().map(|&point| Circle::new(point, 3, color.filled())))
            .map_err(render_error)?;
    }

    if let Some((value, label)) = reference {
        context
            .draw_series(LineSeries::new(
                [(x_range.start, value), (x_range.end, value)],
                BLACK.stroke_width(1),
            ))
            .map_err(render_error)?
            .label(label)
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));
    }

    if !series.is_empty() || reference.is_some() {
        context
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_error)?;
    }

    root.present().map_err(render_error)
}

pub fn render(chart: &Chart, path: &Path, options: &PlotOptions) -> Result<(), PlotError> {
    let size = (options.width, options.height);

    match options.format {
        ImageFormat::Png => draw(BitMapBackend::new(path, size).into_drawing_area(), chart),
        ImageFormat::Svg => draw(SVGBackend::new(path, size).into_drawing_area(), chart),
    }
}

/// Render every chart (and the results table) of one variant into `<output>/<variant>/`
#[instrument(skip(dataset, options), fields(records = dataset.records.len()))]
pub fn render_report(
    dataset: &Dataset,
    variant: &str,
    options: &PlotOptions,
) -> Result<Vec<PathBuf>, PlotError> {
    let dir = options.output.join(variant);

    fs::create_dir_all(&dir).map_err(|source| PlotError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut written = Vec::new();

    for chart in charts(dataset, options) {
        let path = dir.join(format!("{}.{}", chart.file_stem, options.format.extension()));

        render(&chart, &path, options)?;
        debug!(path = ?path, series = chart.series.len(), "Rendered chart");
        written.push(path);
    }

    if options.table {
        let path = dir.join(table::TABLE_FILE);

        fs::write(&path, table::render_table(dataset)).map_err(|source| PlotError::Io {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }

    info!("Wrote {} files to {}", written.len(), dir.display());

    Ok(written)
}

/// Render one report per variant of the run. An empty run still gets an
/// (empty) report under `fallback_variant`.
pub fn render_run(
    dataset: &Dataset,
    fallback_variant: &str,
    options: &PlotOptions,
) -> Result<Vec<PathBuf>, PlotError> {
    let variants = match dataset.variants() {
        variants if variants.is_empty() => {
            warn!("No artifacts matched the run, rendering empty charts");
            vec![fallback_variant]
        }
        variants => variants,
    };

    let mut written = Vec::new();

    for variant in variants {
        written.extend(render_report(&dataset.for_variant(variant), variant, options)?);
    }

    Ok(written)
}

#[cfg(test)]
#[path = "plot_test.rs"]
mod tests;
