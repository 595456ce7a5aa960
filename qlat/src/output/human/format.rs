pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Renders a microsecond latency with a unit picked to keep three significant digits.
pub(crate) fn format_micros(us: u32) -> String {
    format_micros_f64(f64::from(us))
}

pub(crate) fn format_micros_f64(us: f64) -> String {
    if !us.is_finite() {
        return "n/a".to_string();
    }
    if us >= 1_000_000.0 {
        return format!("{:.2}s", us / 1_000_000.0);
    }
    if us >= 1_000.0 {
        return format!("{:.2}ms", us / 1_000.0);
    }
    format!("{us:.0}us")
}
