//! Neural collaborative filtering model: user and item embeddings fed through
//! a ReLU MLP down to a single sigmoid score.
//!
//! The model is frozen once constructed. Every method takes `&self`, so a
//! loaded model can be shared across request threads without locking and
//! there is no training-mode state to switch off.

use crate::checkpoint::{
    hidden_bias_name, hidden_weight_name, StateDict, TensorRecord, ITEM_EMBEDDING, OUTPUT_BIAS,
    OUTPUT_WEIGHT, USER_EMBEDDING,
};
use cinerank_core::config::RecommenderConfig;
use cinerank_core::error::{InferenceError, LoadError};
use cinerank_core::ids::{ItemIndex, UserIndex};
use cinerank_core::inference::ScoringModel;
use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;
use rand_distr::Normal;

const DEFAULT_CHUNK_ROWS: usize = 8192;

/// Shape of the network, fixed at training time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDims {
    pub num_users: usize,
    pub num_items: usize,
    pub embedding_dim: usize,
    pub hidden_dims: Vec<usize>,
}

impl ModelDims {
    pub fn from_config(config: &RecommenderConfig) -> Self {
        Self {
            num_users: config.num_users,
            num_items: config.num_items,
            embedding_dim: config.embedding_dim,
            hidden_dims: config.hidden_dims.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.num_users == 0 || self.num_items == 0 {
            return Err(LoadError::InvalidDimensions(format!(
                "embedding tables need at least one row (users={}, items={})",
                self.num_users, self.num_items
            )));
        }
        if self.embedding_dim == 0 {
            return Err(LoadError::InvalidDimensions(
                "embedding_dim must be positive".to_string(),
            ));
        }
        if self.hidden_dims.is_empty() {
            return Err(LoadError::InvalidDimensions(
                "at least one hidden layer is required".to_string(),
            ));
        }
        if self.hidden_dims.contains(&0) {
            return Err(LoadError::InvalidDimensions(format!(
                "hidden layer widths must be positive, got {:?}",
                self.hidden_dims
            )));
        }
        Ok(())
    }

    /// Width of the concatenated (user, item) embedding row.
    pub fn input_dim(&self) -> usize {
        self.embedding_dim * 2
    }

    /// (fan_in, fan_out) of each hidden layer, then of the output layer.
    fn layer_shapes(&self) -> Vec<(usize, usize)> {
        let mut shapes = Vec::with_capacity(self.hidden_dims.len() + 1);
        let mut fan_in = self.input_dim();
        for &width in &self.hidden_dims {
            shapes.push((fan_in, width));
            fan_in = width;
        }
        shapes.push((fan_in, 1));
        shapes
    }
}

/// Fully connected layer, weight stored `out × in`.
#[derive(Debug, Clone)]
struct DenseLayer {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseLayer {
    fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        input.dot(&self.weight.t()) + &self.bias
    }

    fn take(
        state: &mut StateDict,
        weight_name: &str,
        bias_name: &str,
        fan_in: usize,
        fan_out: usize,
    ) -> Result<Self, LoadError> {
        let weight = take_param(state, weight_name)?.into_array2(weight_name, fan_out, fan_in)?;
        let bias = take_param(state, bias_name)?.into_array1(bias_name, fan_out)?;
        Ok(Self { weight, bias })
    }

    /// Xavier-uniform weights, bias uniform in ±1/sqrt(fan_in).
    fn initialized<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Self {
        let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let weight = Array2::from_shape_simple_fn((fan_out, fan_in), || rng.gen_range(-bound..bound));
        let bias_bound = 1.0 / (fan_in as f32).sqrt();
        let bias = Array1::from_shape_simple_fn(fan_out, || rng.gen_range(-bias_bound..bias_bound));
        Self { weight, bias }
    }
}

fn take_param(state: &mut StateDict, name: &str) -> Result<TensorRecord, LoadError> {
    state
        .remove(name)
        .ok_or_else(|| LoadError::MissingParameter(name.to_string()))
}

/// The trained embedding + MLP scorer.
#[derive(Debug, Clone)]
pub struct NcfModel {
    dims: ModelDims,
    user_embedding: Array2<f32>,
    item_embedding: Array2<f32>,
    hidden: Vec<DenseLayer>,
    output: DenseLayer,
    chunk_rows: usize,
}

impl NcfModel {
    /// Build the model from a checkpoint's parameter bundle.
    ///
    /// Loading is strict: every expected parameter must be present with the
    /// exact shape implied by `dims`, and nothing else may be in the bundle.
    pub fn from_state_dict(dims: ModelDims, mut state: StateDict) -> Result<Self, LoadError> {
        dims.validate()?;

        let user_embedding = take_param(&mut state, USER_EMBEDDING)?.into_array2(
            USER_EMBEDDING,
            dims.num_users,
            dims.embedding_dim,
        )?;
        let item_embedding = take_param(&mut state, ITEM_EMBEDDING)?.into_array2(
            ITEM_EMBEDDING,
            dims.num_items,
            dims.embedding_dim,
        )?;

        let shapes = dims.layer_shapes();
        let (hidden_shapes, output_shape) = shapes.split_at(dims.hidden_dims.len());

        let hidden = hidden_shapes
            .iter()
            .enumerate()
            .map(|(k, &(fan_in, fan_out))| {
                DenseLayer::take(
                    &mut state,
                    &hidden_weight_name(k),
                    &hidden_bias_name(k),
                    fan_in,
                    fan_out,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (fan_in, fan_out) = output_shape[0];
        let output = DenseLayer::take(&mut state, OUTPUT_WEIGHT, OUTPUT_BIAS, fan_in, fan_out)?;

        if let Some(extra) = state.keys().next() {
            return Err(LoadError::UnexpectedParameter(extra.clone()));
        }

        Ok(Self {
            dims,
            user_embedding,
            item_embedding,
            hidden,
            output,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        })
    }

    /// Fresh, untrained weights using the training job's initialization scheme:
    /// embeddings normal with std 0.01, Xavier-uniform linear weights, biases
    /// uniform in ±1/sqrt(fan_in).
    pub fn with_initial_weights<R: Rng>(dims: ModelDims, rng: &mut R) -> Result<Self, LoadError> {
        dims.validate()?;

        let normal = Normal::new(0.0f32, 0.01)
            .map_err(|e| LoadError::InvalidDimensions(format!("embedding initializer: {e}")))?;
        let mut embedding = |rows: usize| {
            Array2::from_shape_simple_fn((rows, dims.embedding_dim), || rng.sample(normal))
        };
        let user_embedding = embedding(dims.num_users);
        let item_embedding = embedding(dims.num_items);

        let mut layers: Vec<DenseLayer> = dims
            .layer_shapes()
            .into_iter()
            .map(|(fan_in, fan_out)| DenseLayer::initialized(fan_in, fan_out, &mut *rng))
            .collect();
        let output = layers.pop().ok_or_else(|| {
            LoadError::InvalidDimensions("model has no output layer".to_string())
        })?;

        Ok(Self {
            dims,
            user_embedding,
            item_embedding,
            hidden: layers,
            output,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        })
    }

    /// Cap on rows evaluated at once inside a batch. Bounds the size of the
    /// intermediate activation matrices for very large catalogs.
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows.max(1);
        self
    }

    pub fn dims(&self) -> &ModelDims {
        &self.dims
    }

    /// Export parameters under their checkpoint names.
    pub fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert(
            USER_EMBEDDING.to_string(),
            TensorRecord::from_array2(&self.user_embedding),
        );
        state.insert(
            ITEM_EMBEDDING.to_string(),
            TensorRecord::from_array2(&self.item_embedding),
        );
        for (k, layer) in self.hidden.iter().enumerate() {
            state.insert(hidden_weight_name(k), TensorRecord::from_array2(&layer.weight));
            state.insert(hidden_bias_name(k), TensorRecord::from_array1(&layer.bias));
        }
        state.insert(
            OUTPUT_WEIGHT.to_string(),
            TensorRecord::from_array2(&self.output.weight),
        );
        state.insert(
            OUTPUT_BIAS.to_string(),
            TensorRecord::from_array1(&self.output.bias),
        );
        state
    }

    /// Forward pass for one chunk of items against a single user row.
    fn forward_chunk(&self, user: usize, items: &[ItemIndex]) -> Array1<f32> {
        let dim = self.dims.embedding_dim;
        let user_row = self.user_embedding.row(user);

        let mut x = Array2::<f32>::zeros((items.len(), dim * 2));
        for (mut row, item) in x.axis_iter_mut(Axis(0)).zip(items) {
            row.slice_mut(s![..dim]).assign(&user_row);
            row.slice_mut(s![dim..]).assign(&self.item_embedding.row(item.0));
        }

        for layer in &self.hidden {
            x = layer.forward(&x);
            x.mapv_inplace(|v| v.max(0.0));
        }

        let logits = self.output.forward(&x);
        logits.column(0).mapv(sigmoid)
    }
}

impl ScoringModel for NcfModel {
    fn score_batch(
        &self,
        user: UserIndex,
        items: &[ItemIndex],
    ) -> Result<Vec<f32>, InferenceError> {
        if user.0 >= self.dims.num_users {
            return Err(InferenceError::IndexOutOfRange {
                kind: "user",
                index: user.0,
                bound: self.dims.num_users,
            });
        }
        if let Some(bad) = items.iter().find(|item| item.0 >= self.dims.num_items) {
            return Err(InferenceError::IndexOutOfRange {
                kind: "item",
                index: bad.0,
                bound: self.dims.num_items,
            });
        }

        let mut scores = Vec::with_capacity(items.len());
        for chunk in items.chunks(self.chunk_rows) {
            let chunk_scores = self.forward_chunk(user.0, chunk);
            scores.extend(chunk_scores.iter().copied());
        }
        Ok(scores)
    }

    fn num_users(&self) -> usize {
        self.dims.num_users
    }

    fn num_items(&self) -> usize {
        self.dims.num_items
    }

    fn name(&self) -> &str {
        "ncf_mlp"
    }
}

/// Logistic function in a form that does not overflow for large |x|.
fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_dims() -> ModelDims {
        ModelDims {
            num_users: 4,
            num_items: 10,
            embedding_dim: 3,
            hidden_dims: vec![8, 4],
        }
    }

    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    /// One-dimensional model whose score for item i is exactly `targets[i]`.
    /// The hidden layer shifts the item embedding positive so ReLU keeps it,
    /// and the output layer shifts it back.
    fn fixed_score_state(targets: &[f32]) -> (ModelDims, StateDict) {
        let dims = ModelDims {
            num_users: 1,
            num_items: targets.len(),
            embedding_dim: 1,
            hidden_dims: vec![1],
        };
        let items = Array2::from_shape_vec(
            (targets.len(), 1),
            targets.iter().map(|&p| logit(p)).collect(),
        )
        .unwrap();

        let mut state = StateDict::new();
        state.insert(USER_EMBEDDING.into(), TensorRecord::from_array2(&array![[0.0]]));
        state.insert(ITEM_EMBEDDING.into(), TensorRecord::from_array2(&items));
        state.insert(hidden_weight_name(0), TensorRecord::from_array2(&array![[0.0, 1.0]]));
        state.insert(hidden_bias_name(0), TensorRecord::from_array1(&array![10.0]));
        state.insert(OUTPUT_WEIGHT.into(), TensorRecord::from_array2(&array![[1.0]]));
        state.insert(OUTPUT_BIAS.into(), TensorRecord::from_array1(&array![-10.0]));
        (dims, state)
    }

    #[test]
    fn test_handcrafted_weights_reproduce_target_scores() {
        let (dims, state) = fixed_score_state(&[0.9, 0.2, 0.95]);
        let model = NcfModel::from_state_dict(dims, state).unwrap();
        let scores = model
            .score_batch(UserIndex(0), &[ItemIndex(0), ItemIndex(1), ItemIndex(2)])
            .unwrap();
        assert!((scores[0] - 0.9).abs() < 1e-4);
        assert!((scores[1] - 0.2).abs() < 1e-4);
        assert!((scores[2] - 0.95).abs() < 1e-4);
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = NcfModel::with_initial_weights(small_dims(), &mut rng).unwrap();
        let items: Vec<ItemIndex> = (0..10).map(ItemIndex).collect();
        for user in 0..4 {
            let scores = model.score_batch(UserIndex(user), &items).unwrap();
            assert_eq!(scores.len(), 10);
            assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn test_extreme_logits_saturate_without_nan() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_chunking_does_not_change_scores() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = NcfModel::with_initial_weights(small_dims(), &mut rng).unwrap();
        let items: Vec<ItemIndex> = (0..10).rev().map(ItemIndex).collect();

        let whole = model.score_batch(UserIndex(2), &items).unwrap();
        let chunked = model
            .clone()
            .with_chunk_rows(3)
            .score_batch(UserIndex(2), &items)
            .unwrap();
        for (a, b) in whole.iter().zip(&chunked) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_state_dict_round_trip_preserves_scores() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = NcfModel::with_initial_weights(small_dims(), &mut rng).unwrap();
        let reloaded = NcfModel::from_state_dict(small_dims(), model.state_dict()).unwrap();

        let items: Vec<ItemIndex> = (0..10).map(ItemIndex).collect();
        assert_eq!(
            model.score_batch(UserIndex(1), &items).unwrap(),
            reloaded.score_batch(UserIndex(1), &items).unwrap()
        );
    }

    #[test]
    fn test_missing_parameter_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = NcfModel::with_initial_weights(small_dims(), &mut rng)
            .unwrap()
            .state_dict();
        state.remove(&hidden_bias_name(1));

        let err = NcfModel::from_state_dict(small_dims(), state).unwrap_err();
        assert!(matches!(err, LoadError::MissingParameter(name) if name == "mlp_layers.2.bias"));
    }

    #[test]
    fn test_unexpected_parameter_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = NcfModel::with_initial_weights(small_dims(), &mut rng)
            .unwrap()
            .state_dict();
        state.insert(
            "mlp_layers.4.weight".to_string(),
            TensorRecord {
                shape: vec![1],
                data: vec![0.0],
            },
        );

        let err = NcfModel::from_state_dict(small_dims(), state).unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedParameter(_)));
    }

    #[test]
    fn test_embedding_dim_must_match_checkpoint() {
        let mut rng = StdRng::seed_from_u64(1);
        let state = NcfModel::with_initial_weights(small_dims(), &mut rng)
            .unwrap()
            .state_dict();
        let wider = ModelDims {
            embedding_dim: 4,
            ..small_dims()
        };
        let err = NcfModel::from_state_dict(wider, state).unwrap_err();
        assert!(matches!(err, LoadError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_overflowing_checkpoint_shape_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = NcfModel::with_initial_weights(small_dims(), &mut rng)
            .unwrap()
            .state_dict();
        state.insert(
            USER_EMBEDDING.to_string(),
            TensorRecord {
                shape: vec![usize::MAX, 2],
                data: vec![0.0; 2],
            },
        );

        let err = NcfModel::from_state_dict(small_dims(), state).unwrap_err();
        assert!(matches!(err, LoadError::ShapeMismatch { name, .. } if name == USER_EMBEDDING));
    }

    #[test]
    fn test_initial_embeddings_are_small() {
        let mut rng = StdRng::seed_from_u64(9);
        let model = NcfModel::with_initial_weights(small_dims(), &mut rng).unwrap();
        let state = model.state_dict();
        let user = &state[USER_EMBEDDING].data;
        assert_eq!(user.len(), 4 * 3);
        assert!(user.iter().all(|v| v.abs() < 0.1));
        assert!(user.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_empty_hidden_dims_rejected() {
        let dims = ModelDims {
            hidden_dims: vec![],
            ..small_dims()
        };
        assert!(matches!(
            dims.validate(),
            Err(LoadError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_out_of_range_indices_rejected() {
        let mut rng = StdRng::seed_from_u64(5);
        let model = NcfModel::with_initial_weights(small_dims(), &mut rng).unwrap();

        let err = model.score_batch(UserIndex(4), &[ItemIndex(0)]).unwrap_err();
        assert_eq!(
            err,
            InferenceError::IndexOutOfRange {
                kind: "user",
                index: 4,
                bound: 4
            }
        );
        assert!(model.score_batch(UserIndex(0), &[ItemIndex(10)]).is_err());
    }
}
