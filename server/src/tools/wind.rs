use anyhow::Result;

use crate::wind::WindSource;

pub async fn exec(url: &str) -> Result<()> {
    let grid = WindSource::new(url)?.load().await?;
    let h = &grid.header;

    println!("Wind reference time: {} UTC", h.ref_time);
    println!("Grid: {} x {} cells of {} x {} deg", h.nx, h.ny, h.dx, h.dy);
    match grid.bounds() {
        Some(b) => println!(
            "Bounds: {:.2},{:.2} to {:.2},{:.2}",
            b.sw.lng, b.sw.lat, b.ne.lng, b.ne.lat
        ),
        None => println!("Bounds: unknown (header incomplete)"),
    }

    let max_speed = grid
        .u()
        .iter()
        .zip(grid.v())
        .map(|(u, v)| u.hypot(*v))
        .fold(0.0, f64::max);
    println!("Max speed: {:.1} {}", max_speed, h.parameter_unit);
    Ok(())
}
