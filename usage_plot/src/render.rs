use std::path::Path;

use anyhow::{anyhow, Context as _, Result};
use image::{ImageFormat, RgbImage};
use plotters::prelude::BitMapBackend;

use crate::config::Settings;

/// Figure size in inches, the pixel size follows from the dpi.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureSize {
    pub width: f64,
    pub height: f64,
}

impl FigureSize {
    pub const GPU_HOURS: FigureSize = FigureSize { width: 12.0, height: 6.0 };
    pub const NODES: FigureSize = FigureSize { width: 10.0, height: 8.0 };
    pub const AGGREGATE: FigureSize = FigureSize { width: 6.0, height: 4.0 };

    pub fn in_pixels(self, dpi: u32) -> (u32, u32) {
        let px = |inches: f64| (inches * f64::from(dpi)).round() as u32;
        (px(self.width), px(self.height))
    }
}

/// Font and scale for all charts. Sizes are given in points and scaled with the dpi.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme<'a> {
    pub font_family: &'a str,
    pub dpi: u32,
}

impl<'a> From<&'a Settings> for Theme<'a> {
    fn from(settings: &'a Settings) -> Self {
        Theme {
            font_family: &settings.font_family,
            dpi: settings.dpi,
        }
    }
}

impl Theme<'_> {
    pub fn points_to_px(&self, points: f64) -> f64 {
        points * f64::from(self.dpi) / 72.0
    }

    pub fn px(&self, points: f64) -> u32 {
        self.points_to_px(points).round() as u32
    }
}

pub fn create_bitmap_buffer(buf: &mut Vec<u8>, (x, y): (u32, u32)) -> BitMapBackend {
    let len = x as usize * y as usize * 3; // RGB: bit depth = 24
    buf.clear();
    buf.resize(len, 0);

    BitMapBackend::with_buffer(buf.as_mut_slice(), (x, y))
}

/// Draws into an RGB buffer of `size` pixels and writes the result to `path` as PNG.
pub fn render_png<F>(path: &Path, size: (u32, u32), draw: F) -> Result<()>
where
    F: FnOnce(BitMapBackend) -> Result<()>,
{
    let mut buf = Vec::new();
    draw(create_bitmap_buffer(&mut buf, size))
        .with_context(|| format!("rendering {}", path.display()))?;

    let image = RgbImage::from_raw(size.0, size.1, buf)
        .ok_or_else(|| anyhow!("failed to create image from internal buffer (too small?)"))
        .with_context(|| format!("rendering {}", path.display()))?;
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;

    Ok(())
}

pub mod plot {
    use std::ops::Range;

    use anyhow::{ensure, Result};
    use itertools::Itertools as _;
    use plotters::{
        coord::{types::RangedCoordf64, Shift},
        prelude::*,
        style::text_anchor::{HPos, Pos, VPos},
    };
    use usage_data::{NodeTable, Resource, UsageRow};

    use super::Theme;

    type SlotChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

    const GPU_HOURS_TITLE: &str = "GPU-Hours per User";
    const AGGREGATE_TITLE: &str = "Aggregate Resource Usage (Used + Free)";

    const TITLE_PT: f64 = 12.0;
    const SUPTITLE_PT: f64 = 14.0;
    const LABEL_PT: f64 = 10.0;
    const TICK_PT: f64 = 8.0;
    /// Distance between the x axis and its labels.
    const LABEL_GAP_PT: f64 = 3.0;

    /// Share of a slot covered by its bar.
    const BAR_WIDTH: f64 = 0.8;

    const STEEL_BLUE: RGBColor = RGBColor(70, 130, 180);
    const SEA_GREEN: RGBColor = RGBColor(46, 139, 87);
    const SALMON: RGBColor = RGBColor(250, 128, 114);
    const FREE_GRAY: RGBColor = RGBColor(0xcc, 0xcc, 0xcc);

    fn used_color(resource: Resource) -> RGBColor {
        match resource {
            Resource::Cpu => STEEL_BLUE,
            Resource::Memory => SEA_GREEN,
            Resource::Gpu => SALMON,
        }
    }

    /// Top of the y axis: a bit of headroom over the highest bar, never an empty range.
    pub fn y_upper_bound(values: impl IntoIterator<Item = f64>) -> f64 {
        let max = values.into_iter().fold(0f64, f64::max);
        if max > 0.0 {
            max * 1.05
        } else {
            1.0
        }
    }

    /// x axis with one unit wide slot per bar, and nothing else.
    pub fn slot_range(slots: u32) -> Range<f64> {
        0.0..f64::from(slots)
    }

    pub fn slot_center(slot: u32) -> f64 {
        f64::from(slot) + 0.5
    }

    /// Room below the x axis for vertical labels plus the axis description.
    fn rotated_label_area(theme: &Theme, labels: &[String]) -> u32 {
        let longest = labels.iter().map(|label| label.chars().count()).max().unwrap_or(0);
        // average glyph is roughly 0.6em wide
        (longest as f64 * theme.points_to_px(TICK_PT) * 0.6).round() as u32
            + theme.px(LABEL_GAP_PT + 2.5 * LABEL_PT)
    }

    fn font<'a>(theme: &Theme<'a>, points: f64) -> FontDesc<'a> {
        (theme.font_family, theme.points_to_px(points)).into_font()
    }

    /// Reads bottom to top and hangs below the anchor, centered on it horizontally.
    fn rotated<'a>(theme: &Theme<'a>, points: f64) -> TextStyle<'a> {
        TextStyle::from(font(theme, points))
            .pos(Pos::new(HPos::Right, VPos::Center))
            .transform(FontTransform::Rotate270)
    }

    fn upright<'a>(theme: &Theme<'a>, points: f64) -> TextStyle<'a> {
        TextStyle::from(font(theme, points)).pos(Pos::new(HPos::Center, VPos::Top))
    }

    /// Writes one label under the center of each slot. The mesh can't be used for this: it
    /// forces its own anchor onto x labels, which puts half of a rotated label above the axis.
    fn slot_labels<DB>(
        area: &DrawingArea<DB, Shift>,
        chart: &SlotChart<'_, DB>,
        theme: &Theme,
        labels: &[String],
        style: &TextStyle,
    ) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        let (base_x, base_y) = area.get_base_pixel();
        let gap = theme.px(LABEL_GAP_PT) as i32;
        for (slot, label) in (0u32..).zip(labels) {
            let (x, y) = chart.backend_coord(&(slot_center(slot), 0.0));
            area.draw_text(label, style, (x - base_x, y - base_y + gap))?;
        }
        Ok(())
    }

    /// Left and right edge of the bar in `slot`.
    pub fn bar_edges(slot: u32) -> (f64, f64) {
        let half = BAR_WIDTH / 2.0;
        (slot_center(slot) - half, slot_center(slot) + half)
    }

    fn bar(slot: u32, bottom: f64, top: f64, style: ShapeStyle) -> Rectangle<(f64, f64)> {
        let (left, right) = bar_edges(slot);
        Rectangle::new([(left, bottom), (right, top)], style)
    }

    fn legend_swatch(theme: &Theme, color: RGBColor) -> impl Fn((i32, i32)) -> Rectangle<(i32, i32)> {
        let half = theme.px(4.0) as i32;
        move |(x, y)| Rectangle::new([(x, y - half), (x + 2 * half, y + half)], color.filled())
    }

    /// One bar per user, in the given order.
    pub fn gpu_hours<DB>(backend: DB, theme: &Theme, rows: &[&UsageRow]) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        ensure!(!rows.is_empty(), "empty dataset");
        let labels = rows.iter().map(|row| row.user.to_string()).collect_vec();
        let slots = u32::try_from(labels.len())?;

        let drawing_area = backend.into_drawing_area();
        drawing_area.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&drawing_area)
            .caption(GPU_HOURS_TITLE, font(theme, TITLE_PT))
            .margin(theme.px(8.0))
            .x_label_area_size(rotated_label_area(theme, &labels))
            .y_label_area_size(theme.px(5.0 * LABEL_PT))
            .build_cartesian_2d(
                slot_range(slots),
                0f64..y_upper_bound(rows.iter().map(|row| row.gpu_hours)),
            )?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(0)
            .y_label_style(font(theme, TICK_PT))
            .x_desc("User")
            .y_desc("GPU-Hours")
            .axis_desc_style(font(theme, LABEL_PT))
            .draw()?;

        chart.draw_series(
            (0u32..)
                .zip(rows)
                .map(|(slot, row)| bar(slot, 0.0, row.gpu_hours, STEEL_BLUE.filled())),
        )?;
        slot_labels(&drawing_area, &chart, theme, &labels, &rotated(theme, TICK_PT))?;

        drawing_area.present()?;
        Ok(())
    }

    fn node_panel<DB>(
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        table: &NodeTable,
        resource: Resource,
        labels: &[String],
        label_area: Option<u32>,
    ) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        let slots = u32::try_from(labels.len())?;
        let mut chart = ChartBuilder::on(area)
            .margin(theme.px(4.0))
            .x_label_area_size(label_area.unwrap_or(theme.px(TICK_PT)))
            .y_label_area_size(theme.px(6.0 * LABEL_PT))
            .build_cartesian_2d(
                slot_range(slots),
                0f64..y_upper_bound(table.rows().iter().map(|row| row.total(resource))),
            )?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(0)
            .y_label_style(font(theme, TICK_PT))
            .y_desc(resource.label())
            .axis_desc_style(font(theme, LABEL_PT))
            .draw()?;

        let color = used_color(resource);
        chart
            .draw_series(
                (0u32..)
                    .zip(table.rows())
                    .map(|(slot, row)| bar(slot, 0.0, row.used(resource), color.filled())),
            )?
            .label("Used")
            .legend(legend_swatch(theme, color));
        chart
            .draw_series((0u32..).zip(table.rows()).map(|(slot, row)| {
                bar(slot, row.used(resource), row.total(resource), FREE_GRAY.filled())
            }))?
            .label("Free")
            .legend(legend_swatch(theme, FREE_GRAY));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font(font(theme, TICK_PT))
            .draw()?;

        // x axis is shared, only the bottom panel names the nodes
        if label_area.is_some() {
            slot_labels(area, &chart, theme, labels, &rotated(theme, TICK_PT))?;
        }

        Ok(())
    }

    /// CPU, memory and GPU panels stacked on top of each other, one used/free bar per node.
    pub fn per_node<DB>(backend: DB, theme: &Theme, title: &str, table: &NodeTable) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        ensure!(!table.is_empty(), "empty dataset");
        let labels = table.rows().iter().map(|row| row.name.clone()).collect_vec();

        let drawing_area = backend.into_drawing_area();
        drawing_area.fill(&WHITE)?;
        let drawing_area = drawing_area.titled(title, font(theme, SUPTITLE_PT))?;

        // all panels get the same plot height, the bottom one also carries the node names
        let label_area = rotated_label_area(theme, &labels);
        let (_, height) = drawing_area.dim_in_pixel();
        let panel_height = height.saturating_sub(label_area) / Resource::ALL.len() as u32;
        let (cpu_area, rest) = drawing_area.split_vertically(panel_height);
        let (mem_area, gpu_area) = rest.split_vertically(panel_height);

        node_panel(&cpu_area, theme, table, Resource::Cpu, &labels, None)?;
        node_panel(&mem_area, theme, table, Resource::Memory, &labels, None)?;
        node_panel(&gpu_area, theme, table, Resource::Gpu, &labels, Some(label_area))?;

        drawing_area.present()?;
        Ok(())
    }

    /// One used/free bar per resource, summed over all nodes.
    pub fn aggregate<DB>(backend: DB, theme: &Theme, table: &NodeTable) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        ensure!(!table.is_empty(), "empty dataset");
        let labels = Resource::ALL.map(|resource| resource.label().to_owned());
        let used = Resource::ALL.map(|resource| table.sum_used(resource));
        let free = Resource::ALL.map(|resource| table.sum_free(resource));
        let slots = Resource::ALL.len() as u32;

        let drawing_area = backend.into_drawing_area();
        drawing_area.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&drawing_area)
            .caption(AGGREGATE_TITLE, font(theme, TITLE_PT))
            .margin(theme.px(8.0))
            .x_label_area_size(theme.px(LABEL_GAP_PT + 2.5 * LABEL_PT))
            .y_label_area_size(theme.px(6.0 * LABEL_PT))
            .build_cartesian_2d(
                slot_range(slots),
                0f64..y_upper_bound(used.iter().zip(&free).map(|(used, free)| used + free)),
            )?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(0)
            .y_label_style(font(theme, TICK_PT))
            .y_desc("Resources")
            .axis_desc_style(font(theme, LABEL_PT))
            .draw()?;

        chart
            .draw_series((0u32..).zip(Resource::ALL).zip(used).map(|((slot, resource), used)| {
                bar(slot, 0.0, used, used_color(resource).filled())
            }))?
            .label("Used")
            .legend(legend_swatch(theme, STEEL_BLUE));
        chart
            .draw_series(
                (0u32..)
                    .zip(used)
                    .zip(free)
                    .map(|((slot, used), free)| bar(slot, used, used + free, FREE_GRAY.filled())),
            )?
            .label("Free")
            .legend(legend_swatch(theme, FREE_GRAY));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font(font(theme, TICK_PT))
            .draw()?;

        slot_labels(&drawing_area, &chart, theme, &labels, &upright(theme, TICK_PT))?;

        drawing_area.present()?;
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use itertools::Itertools as _;
        use usage_data::SlurmUser;

        use super::super::{create_bitmap_buffer, FigureSize};
        use super::*;

        fn theme() -> Theme<'static> {
            Theme {
                font_family: "sans-serif",
                dpi: 150,
            }
        }

        /// What a renderer left in its RGB buffer.
        struct Canvas {
            buf: Vec<u8>,
            width: usize,
            height: usize,
        }

        impl Canvas {
            fn draw(size: (u32, u32), draw: impl FnOnce(BitMapBackend) -> Result<()>) -> Self {
                let mut buf = Vec::new();
                draw(create_bitmap_buffer(&mut buf, size)).unwrap();
                Canvas {
                    buf,
                    width: size.0 as usize,
                    height: size.1 as usize,
                }
            }

            fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
                let i = (y * self.width + x) * 3;
                [self.buf[i], self.buf[i + 1], self.buf[i + 2]]
            }

            /// Text and axis lines, as opposed to bars, grid lines and background.
            fn is_dark(&self, x: usize, y: usize) -> bool {
                self.pixel(x, y).iter().all(|&c| c < 100)
            }

            fn is(&self, x: usize, y: usize, color: RGBColor) -> bool {
                self.pixel(x, y) == [color.0, color.1, color.2]
            }

            /// Consecutive columns for which `hit` holds.
            fn runs(&self, hit: impl Fn(usize) -> bool) -> Vec<Range<usize>> {
                let mut runs: Vec<Range<usize>> = Vec::new();
                for x in (0..self.width).filter(|&x| hit(x)) {
                    match runs.last_mut() {
                        Some(run) if run.end == x => run.end = x + 1,
                        _ => runs.push(x..x + 1),
                    }
                }
                runs
            }

            /// Rows that are dark over more than a third of the width, top to bottom, each with
            /// its longest dark stretch.
            fn x_axes(&self) -> Vec<(usize, Range<usize>)> {
                let rows = (0..self.height)
                    .filter(|&y| (0..self.width).filter(|&x| self.is_dark(x, y)).count() > self.width / 3)
                    .collect_vec();
                rows.iter()
                    .enumerate()
                    .filter(|&(i, &y)| i == 0 || rows[i - 1] + 1 != y)
                    .map(|(_, &y)| {
                        let span = self
                            .runs(|x| self.is_dark(x, y))
                            .into_iter()
                            .max_by_key(|run| run.len())
                            .unwrap();
                        (y, span)
                    })
                    .collect_vec()
            }

            fn lowest_x_axis(&self) -> (usize, Range<usize>) {
                self.x_axes().pop().unwrap()
            }
        }

        fn slot_centers(span: &Range<usize>, slots: usize) -> Vec<usize> {
            (0..slots)
                .map(|i| span.start + (2 * i + 1) * span.len() / (2 * slots))
                .collect_vec()
        }

        fn usage_rows() -> Vec<UsageRow> {
            [("bob", 30.0), ("alice", 20.0), ("carol", 10.0)]
                .into_iter()
                .map(|(user, gpu_hours)| UsageRow {
                    user: SlurmUser(user.to_owned()),
                    gpu_hours,
                })
                .collect_vec()
        }

        #[test]
        fn y_upper_bound_has_headroom() {
            assert!((y_upper_bound([1.0, 20.0, 3.0]) - 21.0).abs() < 1e-9);
        }

        #[test]
        fn y_upper_bound_never_empty() {
            assert_eq!(y_upper_bound([]), 1.0);
            assert_eq!(y_upper_bound([0.0, 0.0]), 1.0);
        }

        #[test]
        fn one_slot_per_bar() {
            assert_eq!(slot_range(3), 0.0..3.0);
            assert_eq!(slot_center(0), 0.5);
            assert_eq!(slot_center(2), 2.5);
            let (left, right) = bar_edges(2);
            assert!(left > 2.0 && right < 3.0);
        }

        #[test]
        fn empty_tables_are_refused() {
            let mut buf = Vec::new();
            let backend = create_bitmap_buffer(&mut buf, (60, 40));
            assert!(per_node(backend, &theme(), "nodes", &NodeTable::default()).is_err());
            let backend = create_bitmap_buffer(&mut buf, (60, 40));
            assert!(aggregate(backend, &theme(), &NodeTable::default()).is_err());
            let backend = create_bitmap_buffer(&mut buf, (60, 40));
            assert!(gpu_hours(backend, &theme(), &[]).is_err());
        }

        #[test]
        fn user_labels_sit_below_the_axis() {
            let rows = usage_rows();
            let rows = rows.iter().collect_vec();
            let canvas = Canvas::draw(FigureSize::GPU_HOURS.in_pixels(150), |backend| {
                gpu_hours(backend, &theme(), &rows)
            });
            let (axis, span) = canvas.lowest_x_axis();

            for y in axis - 40..axis {
                for x in span.start + 3..span.end {
                    assert!(!canvas.is_dark(x, y), "text at ({x}, {y}), axis at {axis}");
                }
            }
            for center in slot_centers(&span, rows.len()) {
                assert!(
                    (axis + 2..axis + 40).any(|y| (center - 8..center + 8).any(|x| canvas.is_dark(x, y))),
                    "no label under slot at {center}"
                );
            }
        }

        #[test]
        fn gpu_hours_fills_every_slot() {
            let rows = usage_rows();
            let rows = rows.iter().collect_vec();
            let canvas = Canvas::draw(FigureSize::GPU_HOURS.in_pixels(150), |backend| {
                gpu_hours(backend, &theme(), &rows)
            });
            let (axis, span) = canvas.lowest_x_axis();

            let bars = canvas.runs(|x| canvas.is(x, axis - 3, STEEL_BLUE));
            assert_eq!(bars.len(), 3, "{bars:?}");
            for (bar, center) in bars.iter().zip(slot_centers(&span, 3)) {
                assert!(bar.contains(&center), "{bar:?} misses {center}");
            }
            // last slot reaches the right end of the axis
            assert!(bars[2].end > span.start + span.len() * 5 / 6);
        }

        #[test]
        fn per_node_draws_every_node_in_every_panel() {
            let table = NodeTable::parse(
                "node1 idle 4/8 0.50 2048/4096MB 1/2\nnode2 mixed 2/8 3.10 1024/4096MB 1/2\n",
            );
            let canvas = Canvas::draw(FigureSize::NODES.in_pixels(150), |backend| {
                per_node(backend, &theme(), "Per-node Resource Usage", &table)
            });

            let axes = canvas.x_axes();
            assert_eq!(axes.len(), 3, "{axes:?}");
            for ((axis, span), color) in axes.iter().zip([STEEL_BLUE, SEA_GREEN, SALMON]) {
                let bars = canvas.runs(|x| canvas.is(x, axis - 3, color));
                assert_eq!(bars.len(), 2, "{bars:?}");
                assert!(bars[1].end > span.start + span.len() * 3 / 4);
            }
        }

        #[test]
        fn node_labels_sit_below_the_axis() {
            let table = NodeTable::parse(
                "node1 idle 4/8 0.50 2048/4096MB 1/2\nnode2 mixed 2/8 3.10 1024/4096MB 1/2\n",
            );
            let canvas = Canvas::draw(FigureSize::NODES.in_pixels(150), |backend| {
                per_node(backend, &theme(), "Per-node Resource Usage", &table)
            });
            let (axis, span) = canvas.lowest_x_axis();

            for y in axis - 40..axis {
                for x in span.start + 3..span.end {
                    assert!(!canvas.is_dark(x, y), "text at ({x}, {y}), axis at {axis}");
                }
            }
        }

        #[test]
        fn aggregate_has_exactly_three_categories() {
            let table = NodeTable::parse("n1 idle 4/8 0.5 8/16 1/2\nn2 idle 2/8 0.5 8/16 0/2\n");
            let canvas = Canvas::draw(FigureSize::AGGREGATE.in_pixels(150), |backend| {
                aggregate(backend, &theme(), &table)
            });
            let (axis, span) = canvas.lowest_x_axis();
            let row = axis - 3;

            let bars = [STEEL_BLUE, SEA_GREEN, SALMON]
                .map(|color| canvas.runs(|x| canvas.is(x, row, color)));
            assert!(bars.iter().all(|runs| runs.len() == 1), "{bars:?}");
            let [cpu, mem, gpu] = bars.map(|mut runs| runs.remove(0));
            assert!(cpu.end <= mem.start && mem.end <= gpu.start);
            assert!(gpu.end > span.start + span.len() * 5 / 6);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn figure_sizes_at_150_dpi() {
        assert_eq!(FigureSize::GPU_HOURS.in_pixels(150), (1800, 900));
        assert_eq!(FigureSize::NODES.in_pixels(150), (1500, 1200));
        assert_eq!(FigureSize::AGGREGATE.in_pixels(150), (900, 600));
    }

    #[test]
    fn theme_scales_points() {
        let theme = Theme {
            font_family: "sans-serif",
            dpi: 144,
        };
        assert_eq!(theme.px(10.0), 20);
    }

    #[test]
    fn bitmap_buffer_is_sized() {
        let mut buf = vec![1, 2, 3];
        let _ = create_bitmap_buffer(&mut buf, (4, 5));
        assert_eq!(buf.len(), 4 * 5 * 3);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
