use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use udp_core::MonitorState;

use crate::state::AppState;

/// Escapes a label value per the OpenMetrics text format.
fn label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let m = &state.monitor;
    let id = label(m.monitor_id());
    let mut out = String::with_capacity(2048);

    writeln!(out, "# TYPE udp_monitor_info info").unwrap();
    writeln!(out, "# HELP udp_monitor_info Information about the UDP monitor").unwrap();
    writeln!(
        out,
        "udp_monitor_info{{monitor_id=\"{}\",created=\"{}\"}} 1",
        id,
        m.created_at().to_rfc3339()
    )
    .unwrap();

    writeln!(out, "# TYPE udp_monitor_state stateset").unwrap();
    writeln!(out, "# HELP udp_monitor_state Current state of the scheduler").unwrap();
    let current = m.state().await;
    for s in MonitorState::ALL {
        writeln!(
            out,
            "udp_monitor_state{{monitor_id=\"{}\",udp_monitor_state=\"{}\"}} {}",
            id,
            s,
            u8::from(s == current)
        )
        .unwrap();
    }

    writeln!(out, "# TYPE udp_monitor_streams gauge").unwrap();
    writeln!(out, "# HELP udp_monitor_streams Number of configured streams").unwrap();
    writeln!(out, "udp_monitor_streams{{monitor_id=\"{}\"}} {}", id, m.streams().len()).unwrap();

    writeln!(out, "# TYPE udp_monitor_cycles counter").unwrap();
    writeln!(out, "# HELP udp_monitor_cycles Completed check cycles").unwrap();
    writeln!(
        out,
        "udp_monitor_cycles_total{{monitor_id=\"{}\"}} {}",
        id,
        m.cycle_count().await
    )
    .unwrap();

    if let Some(report) = m.latest_report().await {
        writeln!(out, "# TYPE udp_monitor_stream_up gauge").unwrap();
        writeln!(
            out,
            "# HELP udp_monitor_stream_up Whether the stream was UP in the latest cycle"
        )
        .unwrap();
        for v in &report.verdicts {
            writeln!(
                out,
                "udp_monitor_stream_up{{monitor_id=\"{}\",stream=\"{}\",url=\"{}\"}} {}",
                id,
                label(&v.name),
                label(&v.url),
                u8::from(v.is_up())
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE udp_monitor_stream_down counter").unwrap();
    writeln!(
        out,
        "# HELP udp_monitor_stream_down DOWN verdicts per stream since start"
    )
    .unwrap();
    let totals = m.down_totals().await;
    for s in m.streams() {
        writeln!(
            out,
            "udp_monitor_stream_down_total{{monitor_id=\"{}\",stream=\"{}\"}} {}",
            id,
            label(&s.name),
            totals.get(&s.name).copied().unwrap_or(0)
        )
        .unwrap();
    }

    if let Some(t) = m.last_checked().await {
        writeln!(out, "# TYPE udp_monitor_last_check_timestamp_seconds gauge").unwrap();
        writeln!(
            out,
            "# HELP udp_monitor_last_check_timestamp_seconds Unix timestamp of the last cycle start"
        )
        .unwrap();
        let secs = t.timestamp() as f64 + (t.timestamp_subsec_millis() as f64 / 1000.0);
        writeln!(
            out,
            "udp_monitor_last_check_timestamp_seconds{{monitor_id=\"{}\"}} {:.3}",
            id, secs
        )
        .unwrap();
    }

    writeln!(out, "# TYPE udp_monitor_uptime_seconds gauge").unwrap();
    writeln!(out, "# HELP udp_monitor_uptime_seconds Time since the monitor was created").unwrap();
    let uptime = (chrono::Utc::now() - m.created_at()).num_milliseconds() as f64 / 1000.0;
    writeln!(out, "udp_monitor_uptime_seconds{{monitor_id=\"{}\"}} {:.3}", id, uptime).unwrap();

    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}
