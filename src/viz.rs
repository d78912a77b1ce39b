//! Chart rendering with Plotters: segment bar chart and retention heatmap.

use plotters::prelude::*;

use crate::analytics::RetentionTable;

/// Bar chart of user counts per RFM segment, saved as a PNG.
///
/// # Arguments
/// * `segments` - (segment label, user count) pairs, already ordered
/// * `output_path` - Path to save the PNG plot
pub fn segment_bar_chart(segments: &[(String, usize)], output_path: &str) -> crate::Result<()> {
    if segments.is_empty() {
        anyhow::bail!("no segments to plot");
    }
    let max_count = segments.iter().map(|(_, c)| *c).max().unwrap_or(1);
    let n = segments.len();

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Users per RFM Segment", ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..n as f64, 0f64..(max_count as f64 * 1.1))?;

    let labels: Vec<String> = segments.iter().map(|(label, _)| label.clone()).collect();
    let formatter = |x: &f64| {
        labels
            .get(x.floor() as usize)
            .cloned()
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.min(24))
        .x_label_formatter(&formatter)
        .x_desc("Segment")
        .y_desc("Users")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(segments.iter().enumerate().map(|(i, (_, count))| {
        Rectangle::new(
            [(i as f64 + 0.15, 0.0), (i as f64 + 0.85, *count as f64)],
            BLUE.filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

/// Heatmap of the retention table: rows = signup cohorts, columns = age in
/// periods, cell shade = retention fraction.
pub fn retention_heatmap(table: &RetentionTable, output_path: &str) -> crate::Result<()> {
    if table.rows.is_empty() {
        anyhow::bail!("no cohorts to plot");
    }
    let n_rows = table.rows.len();
    let n_cols = table.max_age() + 1;

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let title = format!("{} retention by cohort", capitalize(table.period.label()));
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(0f64..n_cols as f64, 0f64..n_rows as f64)?;

    let cohort_labels: Vec<String> = table
        .rows
        .iter()
        .map(|row| row.cohort.format("%Y-%m-%d").to_string())
        .collect();
    let y_formatter = |y: &f64| {
        cohort_labels
            .get(y.floor() as usize)
            .cloned()
            .unwrap_or_default()
    };
    let x_formatter = |x: &f64| format!("{}", x.floor() as usize);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n_cols.min(20))
        .y_labels(n_rows.min(20))
        .x_label_formatter(&x_formatter)
        .y_label_formatter(&y_formatter)
        .x_desc(format!("Age ({} periods)", table.period.label()))
        .y_desc("Signup cohort")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(table.rows.iter().enumerate().flat_map(|(r, row)| {
        row.fractions.iter().enumerate().map(move |(a, &fraction)| {
            Rectangle::new(
                [(a as f64, r as f64), (a as f64 + 1.0, r as f64 + 1.0)],
                heat_color(fraction).filled(),
            )
        })
    }))?;

    root.present()?;
    Ok(())
}

/// White (0.0) to saturated blue (1.0).
fn heat_color(fraction: f64) -> RGBColor {
    let f = fraction.clamp(0.0, 1.0);
    RGBColor(
        (255.0 - 180.0 * f) as u8,
        (255.0 - 120.0 * f) as u8,
        255,
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0.0), RGBColor(255, 255, 255));
        assert_eq!(heat_color(1.0), RGBColor(75, 135, 255));
        // Out-of-range input clamps instead of wrapping.
        assert_eq!(heat_color(2.0), heat_color(1.0));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("weekly"), "Weekly");
        assert_eq!(capitalize(""), "");
    }
}
