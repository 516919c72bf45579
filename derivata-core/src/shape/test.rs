use std::error::Error;

use ndarray::{Array, IxDyn};

use super::*;
use crate::{are_similar, kernels};

fn linspace(shape: &[usize]) -> Result<Value, Box<dyn Error>> {
    let len = numel(shape);
    Ok(Array::linspace(1., len as f64, len).into_shape(IxDyn(shape))?)
}

mod cobroadcast {
    use super::*;

    #[test]
    fn equal_shapes() -> Result<(), Box<dyn Error>> {
        assert_eq!(cobroadcast(&[3, 4], &[3, 4])?, vec![3, 4]);
        Ok(())
    }

    #[test]
    fn stretches_unit_dimensions() -> Result<(), Box<dyn Error>> {
        assert_eq!(cobroadcast(&[3, 1], &[1, 4])?, vec![3, 4]);
        assert_eq!(cobroadcast(&[4], &[2, 3, 4])?, vec![2, 3, 4]);
        assert_eq!(cobroadcast(&[2, 1, 4], &[3, 1])?, vec![2, 3, 4]);
        assert_eq!(cobroadcast(&[], &[2, 2])?, vec![2, 2]);
        Ok(())
    }

    #[test]
    fn incompatible() {
        assert_eq!(
            cobroadcast(&[3, 2], &[3, 4]),
            Err(ShapeError::IncompatibleBroadcast {
                left: vec![3, 2],
                right: vec![3, 4],
            })
        );
    }
}

mod sum_to {
    use super::*;

    #[test]
    fn identity() -> Result<(), Box<dyn Error>> {
        let source = linspace(&[2, 3])?;
        are_similar(&sum_to(&source, &[2, 3])?, &source)
    }

    #[test]
    fn leading_dimensions() -> Result<(), Box<dyn Error>> {
        let source = linspace(&[2, 3])?;
        let expected = Array::from_shape_vec(IxDyn(&[3]), vec![5., 7., 9.])?;
        are_similar(&sum_to(&source, &[3])?, &expected)
    }

    #[test]
    fn unit_dimensions() -> Result<(), Box<dyn Error>> {
        let source = linspace(&[2, 3])?;
        let expected = Array::from_shape_vec(IxDyn(&[2, 1]), vec![6., 15.])?;
        are_similar(&sum_to(&source, &[2, 1])?, &expected)
    }

    #[test]
    fn to_scalar() -> Result<(), Box<dyn Error>> {
        let source = linspace(&[2, 3])?;
        let expected = Array::from_elem(IxDyn(&[]), 21.);
        are_similar(&sum_to(&source, &[])?, &expected)
    }

    #[test]
    fn inverts_expand() -> Result<(), Box<dyn Error>> {
        for (small, big) in [
            (vec![3], vec![2, 3]),
            (vec![1, 3], vec![4, 3]),
            (vec![2, 1, 3], vec![2, 5, 3]),
            (vec![], vec![2, 2]),
        ] {
            let ones = Value::ones(IxDyn(&big));
            let reduced = sum_to(&ones, &small)?;
            assert_eq!(reduced.shape(), small.as_slice());

            let scale = (numel(&big) / numel(&small).max(1)) as f64;
            are_similar(&reduced, &Value::from_elem(IxDyn(&small), scale))?;
        }
        Ok(())
    }

    #[test]
    fn mismatch() {
        let source = Value::zeros(IxDyn(&[2, 3]));
        assert!(matches!(
            sum_to(&source, &[2, 2]),
            Err(ShapeError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            sum_to(&source, &[1, 2, 3, 4]),
            Err(ShapeError::ShapeMismatch { .. })
        ));
    }
}

mod reduced_shape {
    use super::*;

    #[test]
    fn keepdim() -> Result<(), Box<dyn Error>> {
        assert_eq!(reduced_shape(&[2, 3, 4], &[1], true)?, vec![2, 1, 4]);
        assert_eq!(reduced_shape(&[2, 3, 4], &[0, 2], true)?, vec![1, 3, 1]);
        Ok(())
    }

    #[test]
    fn dropdim() -> Result<(), Box<dyn Error>> {
        assert_eq!(reduced_shape(&[2, 3, 4], &[1], false)?, vec![2, 4]);
        assert_eq!(reduced_shape(&[2, 3, 4], &[0, 2], false)?, vec![3]);
        Ok(())
    }

    #[test]
    fn out_of_bounds() {
        assert_eq!(
            reduced_shape(&[2, 3], &[2], false),
            Err(ShapeError::AxisOutOfBounds { axis: 2, ndim: 2 })
        );
    }
}

mod restore_reduced {
    use super::*;

    #[test]
    fn reinserts_unit_dimensions() -> Result<(), Box<dyn Error>> {
        assert_eq!(restore_reduced(&[2, 4], &[1])?, vec![2, 1, 4]);
        assert_eq!(restore_reduced(&[3], &[2, 0])?, vec![1, 3, 1]);
        assert_eq!(restore_reduced(&[], &[0, 1])?, vec![1, 1]);
        Ok(())
    }

    #[test]
    fn inverts_reduction() -> Result<(), Box<dyn Error>> {
        let value = linspace(&[2, 3, 4])?;
        let reduced = kernels::sum_dims(&value, &[0, 2], false)?;
        let kept = kernels::sum_dims(&value, &[0, 2], true)?;
        let restored = restore_reduced(reduced.shape(), &[0, 2])?;

        assert_eq!(restored, kept.shape());
        are_similar(&kernels::reshape(&reduced, &restored)?, &kept)
    }
}

mod unsqueeze_to {
    use super::*;

    #[test]
    fn restores_squeezed() -> Result<(), Box<dyn Error>> {
        assert_eq!(unsqueeze_to(&[2, 3], 1, &[2, 1, 3])?, vec![2, 1, 3]);
        Ok(())
    }

    #[test]
    fn keeps_unsqueezable() -> Result<(), Box<dyn Error>> {
        assert_eq!(unsqueeze_to(&[2, 3], 0, &[2, 3])?, vec![2, 3]);
        Ok(())
    }
}

mod un_narrow {
    use super::*;

    #[test]
    fn pads_with_zeros() -> Result<(), Box<dyn Error>> {
        let grad = Value::ones(IxDyn(&[2, 2]));
        let expected = Array::from_shape_vec(
            IxDyn(&[2, 4]),
            vec![0., 1., 1., 0., 0., 1., 1., 0.],
        )?;
        are_similar(&un_narrow(&grad, 1, 1, 4)?, &expected)
    }

    #[test]
    fn inverts_narrow() -> Result<(), Box<dyn Error>> {
        let value = linspace(&[4, 3])?;
        let narrowed = kernels::narrow(&value, 0, 1, 2)?;
        let restored = un_narrow(&narrowed, 0, 1, 4)?;

        are_similar(&kernels::narrow(&restored, 0, 1, 2)?, &narrowed)?;
        assert_eq!(restored.sum(), narrowed.sum());
        Ok(())
    }

    #[test]
    fn out_of_bounds() {
        let grad = Value::ones(IxDyn(&[3]));
        assert!(matches!(
            un_narrow(&grad, 0, 2, 4),
            Err(ShapeError::InvalidNarrow { .. })
        ));
    }
}

mod inverse_permutation {
    use super::*;

    #[test]
    fn inverts() -> Result<(), Box<dyn Error>> {
        let permutation = [2, 0, 1];
        let inverse = inverse_permutation(&permutation)?;
        assert_eq!(inverse, vec![1, 2, 0]);

        let value = linspace(&[2, 3, 4])?;
        let permuted = kernels::permute(&value, &permutation)?;
        are_similar(&kernels::permute(&permuted, &inverse)?, &value)
    }

    #[test]
    fn rejects_repetitions() {
        assert!(matches!(
            inverse_permutation(&[0, 0, 1]),
            Err(ShapeError::InvalidPermutation { .. })
        ));
        assert!(matches!(
            inverse_permutation(&[0, 3, 1]),
            Err(ShapeError::InvalidPermutation { .. })
        ));
    }
}
