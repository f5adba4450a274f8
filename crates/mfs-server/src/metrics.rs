//! Prometheus text exposition

use mfs::core::stats::Metric;
use std::collections::HashSet;
use std::fmt::Write;

/// Label added to every series
pub const SERVICE_LABEL: (&str, &str) = ("service", "mfs");

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}

/// Render metrics in the Prometheus text format
///
/// `# HELP` and `# TYPE` lines are written once per metric name, before its
/// first sample, when the metric carries them.
pub fn render(metrics: &[Metric]) -> String {
    let mut out = String::new();
    let mut described = HashSet::new();

    for metric in metrics {
        if (metric.help.is_some() || metric.kind.is_some()) && described.insert(metric.name.clone()) {
            if let Some(help) = &metric.help {
                let _ = writeln!(out, "# HELP {} {}", metric.name, help.replace('\n', " "));
            }
            if let Some(kind) = metric.kind {
                let _ = writeln!(out, "# TYPE {} {}", metric.name, kind.as_str());
            }
        }

        let mut labels = vec![format!("{}=\"{}\"", SERVICE_LABEL.0, SERVICE_LABEL.1)];
        labels.extend(
            metric
                .tags
                .iter()
                .filter(|(name, _)| name != SERVICE_LABEL.0)
                .map(|(name, value)| format!("{}=\"{}\"", name, escape_label(value))),
        );

        let _ = writeln!(
            out,
            "{}{{{}}} {}",
            metric.name,
            labels.join(","),
            format_value(metric.value)
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfs::core::stats::MetricKind;

    #[test]
    fn test_render_sample() {
        let text = render(&[Metric::new("acl_count", 2.0)]);
        assert_eq!(text, "acl_count{service=\"mfs\"} 2\n");
    }

    #[test]
    fn test_help_and_type_once() {
        let metrics = vec![
            Metric::new("api_http_requests_total", 3.0)
                .with_help("Requests by handler")
                .with_kind(MetricKind::Counter)
                .with_tag("handler", "GetObject"),
            Metric::new("api_http_requests_total", 1.0)
                .with_help("Requests by handler")
                .with_kind(MetricKind::Counter)
                .with_tag("handler", "PutObject"),
        ];
        let text = render(&metrics);

        assert_eq!(text.matches("# HELP api_http_requests_total").count(), 1);
        assert_eq!(text.matches("# TYPE api_http_requests_total counter").count(), 1);
        assert!(text.contains("api_http_requests_total{service=\"mfs\",handler=\"GetObject\"} 3\n"));
        assert!(text.contains("api_http_requests_total{service=\"mfs\",handler=\"PutObject\"} 1\n"));
    }

    #[test]
    fn test_label_escaping() {
        let text = render(&[Metric::new("m", 0.5).with_tag("path", "a\"b\\c\nd")]);
        assert_eq!(text, "m{service=\"mfs\",path=\"a\\\"b\\\\c\\nd\"} 0.5\n");
    }

    #[test]
    fn test_service_tag_not_duplicated() {
        let text = render(&[Metric::new("m", 1.0).with_tag("service", "other")]);
        assert_eq!(text, "m{service=\"mfs\"} 1\n");
    }

    #[test]
    fn test_infinite_values() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(1.5), "1.5");
    }
}
