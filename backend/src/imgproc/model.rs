use image::imageops::FilterType;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::PredictionRecord;

/// Seed for the model's weight initialization. Initialized once per process
/// and shared across the whole batch.
pub const MODEL_SEED: u64 = 16;

const INPUT_SIZE: u32 = 16;
const FEATURE_DIM: usize = (INPUT_SIZE * INPUT_SIZE * 3) as usize;
pub const MASSIVE_ATTR_DIM: usize = 1000;
pub const CATEGORY_DIM: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Two-headed linear scorer over a fixed pixel-grid embedding: an attribute
/// head and a softmax category head, both with xavier-seeded weights. The
/// weights are frozen at construction; scoring the same bytes with the same
/// seed is fully deterministic.
pub struct FashionModel {
    attr_weights: Array2<f32>,
    category_weights: Array2<f32>,
}

impl FashionModel {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let attr_weights = xavier_uniform(&mut rng, MASSIVE_ATTR_DIM, FEATURE_DIM);
        let category_weights = xavier_uniform(&mut rng, CATEGORY_DIM, FEATURE_DIM);
        Self {
            attr_weights,
            category_weights,
        }
    }

    pub fn predict(&self, image_name: &str, bytes: &[u8]) -> Result<PredictionRecord, ModelError> {
        let features = embed(bytes)?;
        let massive_attr = self.attr_weights.dot(&features).to_vec();
        let categories = softmax(&self.category_weights.dot(&features));
        let category_prediction = argmax(&categories);
        Ok(PredictionRecord {
            image_name: image_name.to_string(),
            massive_attr,
            categories,
            category_prediction,
        })
    }
}

fn xavier_uniform(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f32> {
    let limit = (6.0_f32 / (rows + cols) as f32).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
}

/// Normalized RGB values of the image scaled down to a fixed grid.
fn embed(bytes: &[u8]) -> Result<Array1<f32>, ModelError> {
    let img = image::load_from_memory(bytes)?
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();
    let data: Vec<f32> = img
        .pixels()
        .flat_map(|pixel| pixel.0)
        .map(|channel| f32::from(channel) / 255.0)
        .collect();
    Ok(Array1::from_vec(data))
}

fn softmax(logits: &Array1<f32>) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, _)| index)
        .unwrap_or(0)
}
