use std::{error::Error, result::Result};

use ndarray::{arr0, IxDyn};

use super::*;
use crate::{
    registry::{RegistryBuilder, RegistryConfig},
    test_utils::{are_similar, value},
};

fn scalar(value: f64) -> Variable {
    Variable::leaf(arr0(value).into_dyn())
}

fn grad_of(variable: &Variable) -> Result<Value, Box<dyn Error>> {
    Ok(variable.grad().ok_or("missing grad")?)
}

mod backward {
    use super::*;

    #[test]
    fn shared_input() -> Result<(), Box<dyn Error>> {
        let (a, b) = (scalar(2.), scalar(3.));
        let d = a.add(&a.mul(&b)?)?;
        d.backward(None, false, false)?;

        are_similar(&grad_of(&a)?, &arr0(4.).into_dyn())?;
        are_similar(&grad_of(&b)?, &arr0(2.).into_dyn())
    }

    #[test]
    fn leaf_root() -> Result<(), Box<dyn Error>> {
        let x = scalar(5.);
        x.backward(None, false, false)?;

        are_similar(&grad_of(&x)?, &arr0(1.).into_dyn())
    }

    #[test]
    fn explicit_seed() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[3], vec![1., 2., 3.])?);
        let y = x.mul_scalar(2.)?;
        y.backward(Some(value(&[3], vec![1., 0., -1.])?), false, false)?;

        are_similar(&grad_of(&x)?, &value(&[3], vec![2., 0., -2.])?)
    }

    #[test]
    fn implicit_seed_needs_single_element() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[3], vec![1., 2., 3.])?);
        let y = x.exp()?;

        assert!(matches!(
            y.backward(None, false, false),
            Err(AutogradError::ImplicitSeedRequiresScalar { shape }) if shape == vec![3]
        ));
        assert!(matches!(
            y.backward(Some(Value::ones(IxDyn(&[2]))), false, false),
            Err(AutogradError::ShapeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn gradients_accumulate_across_calls() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![1., 2.])?);
        let y = x.mul(&x)?.sum()?;
        y.backward(None, true, false)?;
        y.backward(None, true, false)?;

        are_similar(&grad_of(&x)?, &value(&[2], vec![4., 8.])?)
    }

    #[test]
    fn released_graph() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![1., 2.])?);
        let y = x.mul(&x)?.sum()?;
        y.backward(None, false, false)?;

        assert!(matches!(
            y.backward(None, false, false),
            Err(AutogradError::GraphReleased { op }) if op == "mul"
        ));
        Ok(())
    }

    #[test]
    fn create_graph_keeps_the_graph() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[3], vec![-1., 0., 2.])?);
        x.sigmoid()?.sum()?.backward(None, false, true)?;
        let dx = x.grad_variable().ok_or("missing grad")?;
        x.zero_grad();
        dx.sum()?.backward(None, false, false)?;

        let expected = x.value().mapv(|x| {
            let s = 1. / (1. + (-x).exp());
            s * (1. - s) * (1. - 2. * s)
        });
        are_similar(&grad_of(&x)?, &expected)?;

        x.zero_grad();
        x.mul(&x)?.mul(&x)?.sum()?.backward(None, false, true)?;
        let dx = x.grad_variable().ok_or("missing grad")?;
        x.zero_grad();
        dx.sum()?.backward(None, false, false)?;

        are_similar(&grad_of(&x)?, &x.value().mapv(|x| 6. * x))
    }

    #[test]
    fn masks_reach_masked_rules_only() -> Result<(), Box<dyn Error>> {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (masked, unmasked) = (Arc::clone(&seen), Arc::clone(&seen));

        let mut table = RegistryBuilder::new(RegistryConfig::default());
        table
            .entry("atan2(Tensor self, Tensor other) -> Tensor")
            .grads("self, other", move |ctx| {
                masked.lock().push((ctx.op().to_string(), ctx.mask().to_vec()));
                Ok(vec![Some(ctx.grad()?), None])
            });
        table
            .entry("mul(Tensor self, Tensor other) -> Tensor")
            .joint("self, other", move |ctx| {
                unmasked.lock().push((ctx.op().to_string(), ctx.mask().to_vec()));
                Ok(vec![Some(ctx.grad()?), Some(ctx.grad()?)])
            });
        let registry = table.build()?;

        let x = Variable::leaf(value(&[2], vec![1., 2.])?);
        let c = Variable::constant(value(&[2], vec![3., 4.])?);
        let y = x.atan2(&c)?.mul(&c)?;
        Engine::new(&registry).backward(&y, Some(value(&[2], vec![1., 1.])?), false, false)?;

        assert_eq!(
            *seen.lock(),
            vec![
                ("mul".to_string(), vec![true, true]),
                ("atan2".to_string(), vec![true, false]),
            ]
        );
        are_similar(&grad_of(&x)?, &value(&[2], vec![1., 1.])?)
    }

    #[test]
    fn diamond_waits_for_both_branches() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![0.5, -1.])?);
        let h = x.exp()?;
        let y = h.sin()?.add(&h.cos()?)?.sum()?;
        y.backward(None, false, false)?;

        let expected = x
            .value()
            .mapv(|x| x.exp() * (x.exp().cos() - x.exp().sin()));
        are_similar(&grad_of(&x)?, &expected)
    }

    #[test]
    fn unused_output_of_multi_output_node() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[4], vec![1., 2., 3., 4.])?);
        let pieces = x.chunk(2, 0)?;
        pieces[1].sum()?.backward(None, false, false)?;

        are_similar(&grad_of(&x)?, &value(&[4], vec![0., 0., 1., 1.])?)
    }

    #[test]
    fn not_implemented_only_when_needed() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![5., 7.])?);
        let divisor = Variable::constant(value(&[2], vec![3., 4.])?);
        x.fmod(&divisor)?.sum()?.backward(None, false, false)?;
        are_similar(&grad_of(&x)?, &value(&[2], vec![1., 1.])?)?;

        let divisor = Variable::leaf(value(&[2], vec![3., 4.])?);
        assert!(matches!(
            x.fmod(&divisor)?.sum()?.backward(None, false, false),
            Err(AutogradError::NotImplementedGradient { op }) if op == "fmod"
        ));
        Ok(())
    }
}

mod parallel {
    use super::*;

    fn wide_graph(x: &Variable) -> crate::Result<Variable> {
        let mut total = x.sin()?.sum()?;
        for branch in 1..16 {
            let term = x.mul_scalar(branch as f64)?.tanh()?.mul(&x.exp()?)?.sum()?;
            total = total.add(&term)?;
        }

        Ok(total)
    }

    #[test]
    fn matches_sequential() -> Result<(), Box<dyn Error>> {
        let registry = registry::global()?;
        let x = Variable::leaf(value(&[3], vec![0.1, -0.4, 0.7])?);

        Engine::new(registry)
            .with_parallelism(false)
            .backward(&wide_graph(&x)?, None, false, false)?;
        let sequential = grad_of(&x)?;
        x.zero_grad();

        let engine = Engine::new(registry).with_parallelism(true);
        assert!(engine.is_parallel());
        engine.backward(&wide_graph(&x)?, None, false, false)?;

        are_similar(&grad_of(&x)?, &sequential)
    }

    #[test]
    fn graphs_built_on_many_threads() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![1., 2.])?);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| x.mul(&x)?.sum()?.backward(None, false, false)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| "worker panicked")?
                        .map_err(|e| e.to_string())
                })
                .collect::<Result<Vec<()>, String>>()
        })?;

        are_similar(&grad_of(&x)?, &value(&[2], vec![16., 32.])?)
    }
}

mod functional {
    use super::*;

    #[test]
    fn leaves_and_unreachable_inputs() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![0., 1.])?);
        let unrelated = Variable::leaf(value(&[2], vec![3., 3.])?);
        let y = x.exp()?.sum()?;

        let grads = grad(&[y], &[x.clone(), unrelated.clone()], &[], false, false)?;
        are_similar(
            grads[0].as_ref().ok_or("missing grad")?.value(),
            &x.value().mapv(f64::exp),
        )?;
        assert!(grads[1].is_none());
        assert!(x.grad().is_none() && unrelated.grad().is_none());
        Ok(())
    }

    #[test]
    fn interior_input() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![1., 2.])?);
        let h = x.mul_scalar(3.)?;
        let y = h.mul(&h)?.sum()?;

        let grads = grad(&[y], &[h.clone()], &[], false, false)?;
        are_similar(
            grads[0].as_ref().ok_or("missing grad")?.value(),
            &value(&[2], vec![6., 12.])?,
        )?;
        assert!(x.grad().is_none());
        Ok(())
    }

    #[test]
    fn several_outputs() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[2], vec![1., 2.])?);
        let first = x.mul_scalar(2.)?;
        let second = x.mul(&x)?;

        let grads = grad(
            &[first, second],
            &[x],
            &[Some(Value::ones(IxDyn(&[2]))), Some(value(&[2], vec![1., -1.])?)],
            false,
            false,
        )?;
        are_similar(
            grads[0].as_ref().ok_or("missing grad")?.value(),
            &value(&[2], vec![4., -2.])?,
        )
    }

    #[test]
    fn seed_count_must_match() -> Result<(), Box<dyn Error>> {
        let x = scalar(1.);
        let y = x.exp()?;

        assert!(matches!(
            grad(&[y], &[x], &[None, None], false, false),
            Err(AutogradError::ArityMismatch { what: "grad_outputs", .. })
        ));
        Ok(())
    }

    #[test]
    fn second_order() -> Result<(), Box<dyn Error>> {
        let x = Variable::leaf(value(&[3], vec![-1., 0.5, 2.])?);
        let y = x.mul(&x)?.mul(&x)?.sum()?;

        let first = grad(&[y], &[x.clone()], &[], true, true)?;
        let first = first[0].clone().ok_or("missing grad")?;
        assert!(first.requires_grad());
        are_similar(first.value(), &x.value().mapv(|x| 3. * x * x))?;

        let second = grad(&[first.sum()?], &[x.clone()], &[], false, false)?;
        are_similar(
            second[0].as_ref().ok_or("missing grad")?.value(),
            &x.value().mapv(|x| 6. * x),
        )
    }

    #[test]
    fn first_order_results_are_constants() -> Result<(), Box<dyn Error>> {
        let x = scalar(2.);
        let y = x.mul(&x)?;

        let grads = grad(&[y], &[x], &[], false, false)?;
        assert!(!grads[0].as_ref().ok_or("missing grad")?.requires_grad());
        Ok(())
    }
}
