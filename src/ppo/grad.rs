//! Gradient-norm clipping over all parameters of a module
//!
//! The optimizer-side `GradientClippingConfig::Norm` bounds each parameter
//! tensor on its own. Here the L2 norm is taken over every gradient of the
//! module at once and all of them are scaled by the same factor.

use burn::module::{Module, ModuleMapper, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

/// Sums the squared gradients registered for the visited parameters
struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    total: f32,
}

impl<B: AutodiffBackend> ModuleMapper<B> for SquaredNorm<'_> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f32>();
        }
        tensor
    }
}

/// Rescales the gradients of the visited parameters in place
struct Rescale<'a> {
    grads: &'a mut GradientsParams,
    factor: f32,
}

impl<B: AutodiffBackend> ModuleMapper<B> for Rescale<'_> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register(id, grad.mul_scalar(self.factor));
        }
        tensor
    }
}

/// Scale every gradient of `module` so that their joint L2 norm is at most
/// `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f32) -> f32
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut squared = SquaredNorm {
        grads: &*grads,
        total: 0.0,
    };
    let module = module.clone().map(&mut squared);
    let norm = squared.total.sqrt();

    let factor = max_norm / (norm + 1e-6);
    if factor < 1.0 {
        module.map(&mut Rescale { grads, factor });
    }

    norm
}
