use indicatif::ProgressStyle;
use proxyscan_common::progress::ProgressReporter;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

/// Bar resolution: hundredths of a percent.
const BAR_LENGTH: u64 = 10_000;

/// Drives the progress bar attached to a span by the indicatif layer.
pub struct BarProgress {
    span: Span,
}

impl BarProgress {
    pub fn new(span: Span) -> Self {
        span.pb_set_style(&bar_style());
        span.pb_set_length(BAR_LENGTH);
        span.pb_set_message("probing");
        Self { span }
    }
}

impl ProgressReporter for BarProgress {
    fn report(&self, percent: f64) {
        let position = (percent.clamp(0.0, 100.0) / 100.0 * BAR_LENGTH as f64).round() as u64;
        self.span.pb_set_position(position);
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg} {wide_bar:.cyan/blue} {percent:>3}% {elapsed_precise}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
        .tick_strings(&[
            "▁▁▁▁▁",
            "▁▂▂▂▁",
            "▁▄▂▄▁",
            "▂▄▆▄▂",
            "▄▆█▆▄",
            "▂▄▆▄▂",
            "▁▄▂▄▁",
            "▁▂▂▂▁",
        ])
}
