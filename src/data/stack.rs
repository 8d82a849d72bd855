/// Frame stacking: concatenate neighbouring frames and subsample in time
use ndarray::{s, Array2, ArrayView2};

/// Stack `num_stack` consecutive frames every `num_skip` frames
///
/// Output frame `j` is the concatenation of input frames
/// `j * num_skip .. j * num_skip + num_stack`, repeating the last frame past
/// the end. The result has `ceil(frames / num_skip)` rows and
/// `input_size * num_stack` columns.
pub fn stack_frames(input: ArrayView2<f32>, num_stack: usize, num_skip: usize) -> Array2<f32> {
    let (frames, dim) = input.dim();
    if frames == 0 || num_skip == 0 {
        return Array2::zeros((0, dim * num_stack));
    }

    let out_frames = frames.div_ceil(num_skip);
    let mut stacked = Array2::zeros((out_frames, dim * num_stack));

    for j in 0..out_frames {
        for k in 0..num_stack {
            let src = (j * num_skip + k).min(frames - 1);
            stacked
                .slice_mut(s![j, k * dim..(k + 1) * dim])
                .assign(&input.row(src));
        }
    }

    stacked
}
