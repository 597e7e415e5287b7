//! Small CNN baselines for 2D images and 3D volumes.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig, Conv3d, Conv3dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, PaddingConfig3d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use medbench_core::ModelKind;

/// Shared hyperparameters of both baselines
#[derive(Config, Debug)]
pub struct SmallCnnConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    #[config(default = "0.2")]
    pub dropout: f64,
}

impl SmallCnnConfig {
    pub fn init_2d<B: Backend>(&self, device: &B::Device) -> SmallCnn2d<B> {
        SmallCnn2d::new(self, device)
    }

    pub fn init_3d<B: Backend>(&self, device: &B::Device) -> SmallCnn3d<B> {
        SmallCnn3d::new(self, device)
    }
}

fn conv2d<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

fn conv3d<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv3d<B> {
    Conv3dConfig::new([in_channels, out_channels], [3, 3, 3])
        .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
        .init(device)
}

fn halving_pool() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

/// Three 3×3 conv layers (32, 64, 128 filters), global average pooling and
/// a linear head.
#[derive(Module, Debug)]
pub struct SmallCnn2d<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    global_pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc: Linear<B>,
    activation: Relu,
}

impl<B: Backend> SmallCnn2d<B> {
    pub fn new(config: &SmallCnnConfig, device: &B::Device) -> Self {
        Self {
            conv1: conv2d(config.in_channels, 32, device),
            conv2: conv2d(32, 64, device),
            conv3: conv2d(64, 128, device),
            pool: halving_pool(),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            fc: LinearConfig::new(128, config.num_classes).init(device),
            activation: Relu::new(),
        }
    }

    /// `[B, C, H, W]` → logits `[B, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.activation.forward(self.conv3.forward(x));

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(self.dropout.forward(x))
    }
}

/// The 3D counterpart of [`SmallCnn2d`] with 8, 16 and 32 filters.
///
/// Burn has no 3D max pooling layer, so pooling by 2 runs as a 2D pool over
/// height and width followed by a `[2, 1]` pool over depth. Both floor odd
/// sizes like a 2×2×2 window would.
#[derive(Module, Debug)]
pub struct SmallCnn3d<B: Backend> {
    conv1: Conv3d<B>,
    conv2: Conv3d<B>,
    conv3: Conv3d<B>,
    pool_hw: MaxPool2d,
    pool_d: MaxPool2d,
    dropout: Dropout,
    fc: Linear<B>,
    activation: Relu,
}

impl<B: Backend> SmallCnn3d<B> {
    pub fn new(config: &SmallCnnConfig, device: &B::Device) -> Self {
        Self {
            conv1: conv3d(config.in_channels, 8, device),
            conv2: conv3d(8, 16, device),
            conv3: conv3d(16, 32, device),
            pool_hw: halving_pool(),
            pool_d: MaxPool2dConfig::new([2, 1]).with_strides([2, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            fc: LinearConfig::new(32, config.num_classes).init(device),
            activation: Relu::new(),
        }
    }

    fn max_pool(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let [b, c, d, h, w] = x.dims();
        let x = self.pool_hw.forward(x.reshape([b, c * d, h, w]));
        let [_, _, h, w] = x.dims();
        let x = self.pool_d.forward(x.reshape([b, c, d, h * w]));
        let [_, _, d, _] = x.dims();
        x.reshape([b, c, d, h, w])
    }

    /// `[B, C, D, H, W]` → logits `[B, num_classes]`
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 2> {
        let x = self.max_pool(self.activation.forward(self.conv1.forward(x)));
        let x = self.max_pool(self.activation.forward(self.conv2.forward(x)));
        let x = self.activation.forward(self.conv3.forward(x));

        // global average over D, H, W
        let [b, c, d, h, w] = x.dims();
        let x = x.reshape([b, c, d * h * w]).mean_dim(2).reshape([b, c]);

        self.fc.forward(self.dropout.forward(x))
    }
}

#[derive(Module, Debug)]
pub enum Architecture<B: Backend> {
    Cnn(SmallCnn2d<B>),
    Cnn3d(SmallCnn3d<B>),
}

/// Either baseline behind one rank-5 input interface
#[derive(Module, Debug)]
pub struct MedClassifier<B: Backend> {
    arch: Architecture<B>,
    num_classes: usize,
}

impl<B: Backend> MedClassifier<B> {
    /// Logits `[B, num_classes]`.
    ///
    /// The 2D model expects a unit depth axis, `[B, C, 1, H, W]`.
    pub fn forward(&self, images: Tensor<B, 5>) -> Tensor<B, 2> {
        match &self.arch {
            Architecture::Cnn(model) => {
                let [b, c, d, h, w] = images.dims();
                model.forward(images.reshape([b, c * d, h, w]))
            }
            Architecture::Cnn3d(model) => model.forward(images),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn kind(&self) -> ModelKind {
        match &self.arch {
            Architecture::Cnn(_) => ModelKind::Cnn,
            Architecture::Cnn3d(_) => ModelKind::Cnn3d,
        }
    }
}

/// Builds the baseline for `kind`
pub fn build_model<B: Backend>(
    kind: ModelKind,
    in_channels: usize,
    num_classes: usize,
    device: &B::Device,
) -> medbench_core::Result<MedClassifier<B>> {
    if in_channels == 0 || num_classes == 0 {
        return Err(medbench_core::Error::Model(format!(
            "Model needs at least one input channel and one class, got {in_channels} and {num_classes}"
        )));
    }
    let config = SmallCnnConfig::new(in_channels, num_classes);
    let arch = match kind {
        ModelKind::Cnn => Architecture::Cnn(config.init_2d(device)),
        ModelKind::Cnn3d => Architecture::Cnn3d(config.init_3d(device)),
    };
    Ok(MedClassifier { arch, num_classes })
}
