use std::path::Path;

use plotters::prelude::*;
use tensorboard_rs::summary_writer::SummaryWriter;

use crate::error::DisentError;

/// Mode maps are only drawn for 2d latents.
pub const PLOT_DIM: i64 = 2;

pub const FIG_WIDTH: u32 = 640;
pub const FIG_HEIGHT: u32 = 480;

/// One color per skill, mirroring the usual matplotlib cycle. Runs with more
/// skills than palette entries are rejected at agent construction.
pub const SKILL_PALETTE: [RGBColor; 10] = [
    RGBColor(0, 0, 255),     // b
    RGBColor(0, 128, 0),     // g
    RGBColor(255, 0, 0),     // r
    RGBColor(0, 191, 191),   // c
    RGBColor(191, 0, 191),   // m
    RGBColor(191, 191, 0),   // y
    RGBColor(0, 0, 0),       // k
    RGBColor(255, 140, 0),   // darkorange
    RGBColor(128, 128, 128), // gray
    RGBColor(144, 238, 144), // lightgreen
];

/// Where a rendered figure goes. A closed set: new destinations are new
/// variants, not strings.
pub enum SaveTarget<'a> {
    /// Image summary in the tensorboard log at the given step.
    Writer(&'a mut SummaryWriter, usize),
    /// PNG file in the given directory.
    File(&'a Path),
}

/// Renders the posterior mode samples colored by skill id into an RGB buffer
/// (FIG_WIDTH x FIG_HEIGHT x 3). Pure function of its inputs, no shared
/// plotting state.
pub fn mode_map_rgb(
    mode_post_samples: &[(f32, f32)],
    skills: &[u8],
) -> Result<Vec<u8>, DisentError> {
    assert!(
        mode_post_samples.len() == skills.len(),
        "mode samples and skill labels disagree in length: {} vs {}",
        mode_post_samples.len(),
        skills.len()
    );
    let mut buffer = vec![0u8; (FIG_WIDTH * FIG_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (FIG_WIDTH, FIG_HEIGHT))
            .into_drawing_area();
        draw_scatter(&root, mode_post_samples, skills)?;
        root.present().map_err(|e| DisentError::Plot(e.to_string()))?;
    }
    Ok(buffer)
}

/// Writes a rendered mode map to its destination.
pub fn save_mode_map(
    mode_post_samples: &[(f32, f32)],
    skills: &[u8],
    target: SaveTarget,
) -> Result<(), DisentError> {
    match target {
        SaveTarget::Writer(writer, step) => {
            let rgb = mode_map_rgb(mode_post_samples, skills)?;
            let chw = rgb_to_chw(&rgb, FIG_WIDTH as usize, FIG_HEIGHT as usize);
            writer.add_image(
                "mode_model/mode_map",
                &chw,
                &[3, FIG_HEIGHT as usize, FIG_WIDTH as usize],
                step,
            );
            Ok(())
        }
        SaveTarget::File(dir) => {
            let path = dir.join("mode_mapping.png");
            let root =
                BitMapBackend::new(&path, (FIG_WIDTH, FIG_HEIGHT)).into_drawing_area();
            draw_scatter(&root, mode_post_samples, skills)?;
            root.present().map_err(|e| DisentError::Plot(e.to_string()))?;
            Ok(())
        }
    }
}

fn draw_scatter<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    mode_post_samples: &[(f32, f32)],
    skills: &[u8],
) -> Result<(), DisentError> {
    let plot_err = |e: DrawingAreaErrorKind<DB::ErrorType>| DisentError::Plot(e.to_string());

    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(root)
        .margin(10)
        .build_cartesian_2d(-3f32..3f32, -3f32..3f32)
        .map_err(plot_err)?;
    // grid lines only, label text needs no font backend this way
    chart
        .configure_mesh()
        .x_labels(0)
        .y_labels(0)
        .draw()
        .map_err(plot_err)?;

    let max_skill = skills.iter().max().copied().unwrap_or(0);
    for skill in 0..=max_skill {
        assert!(
            (skill as usize) < SKILL_PALETTE.len(),
            "no palette color left for skill {skill}"
        );
        let color = SKILL_PALETTE[skill as usize];
        chart
            .draw_series(
                mode_post_samples
                    .iter()
                    .zip(skills.iter())
                    .filter(|(_, s)| **s == skill)
                    .map(|((x, y), _)| Circle::new((*x, *y), 3, color.filled())),
            )
            .map_err(plot_err)?;
    }
    Ok(())
}

// plotters renders interleaved HWC, tensorboard image summaries want CHW
fn rgb_to_chw(rgb: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut chw = vec![0u8; rgb.len()];
    let plane = width * height;
    for pix in 0..plane {
        for c in 0..3 {
            chw[c * plane + pix] = rgb[pix * 3 + c];
        }
    }
    chw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_map_renders_non_empty_figure() {
        let samples = vec![(0.5, 0.5), (-1., 1.), (2., -2.)];
        let skills = vec![0, 1, 1];
        let rgb = mode_map_rgb(&samples, &skills).unwrap();
        assert_eq!(rgb.len(), (FIG_WIDTH * FIG_HEIGHT * 3) as usize);
        // white background plus at least some colored pixels
        assert!(rgb.iter().any(|v| *v != 255));
    }

    #[test]
    #[should_panic(expected = "no palette color")]
    fn too_many_skills_panic() {
        let samples = vec![(0., 0.)];
        let skills = vec![SKILL_PALETTE.len() as u8];
        let _ = mode_map_rgb(&samples, &skills);
    }

    #[test]
    fn file_target_writes_a_png() {
        let dir = std::env::temp_dir().join(format!("mode_disent_plot_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let samples = vec![(0.5, 0.5), (-1., 1.)];
        let skills = vec![0, 1];
        save_mode_map(&samples, &skills, SaveTarget::File(&dir)).unwrap();
        assert!(dir.join("mode_mapping.png").is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn chw_conversion_keeps_channel_planes() {
        // 1x2 image: green pixel then red pixel
        let rgb = [0, 255, 0, 255, 0, 0];
        let chw = rgb_to_chw(&rgb, 2, 1);
        assert_eq!(chw, vec![0u8, 255, 255, 0, 0, 0]);
    }
}
