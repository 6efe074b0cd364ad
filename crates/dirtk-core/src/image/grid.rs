use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::domain::ImageDomain;

/// Generate the world coordinates of every voxel of a domain.
///
/// Returns a tensor of shape `[N, 3]` where N is the number of voxels,
/// enumerated with x fastest.
///
/// # Arguments
/// * `domain` - The sampling grid
/// * `device` - The device to create the tensor on
pub fn world_points_tensor<B: Backend>(domain: &ImageDomain, device: &B::Device) -> Tensor<B, 2> {
    let total = domain.num_voxels();
    let mut grid: Vec<f64> = Vec::with_capacity(total * 3);
    for v in 0..total {
        let p = domain.voxel_to_world(v);
        grid.extend_from_slice(&[p.x, p.y, p.z]);
    }

    Tensor::<B, 2>::from_data(TensorData::new(grid, Shape::new([total, 3])), device)
}
