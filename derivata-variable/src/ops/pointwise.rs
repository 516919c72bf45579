use derivata_core::{kernels, Value};
use ndarray_rand::{rand_distr::Uniform, RandomExt};

use super::record_one;
use crate::{saved::SavedState, Result, Variable};

#[allow(clippy::should_implement_trait)]
impl Variable {
    fn unary(&self, op: &str, value: Value, saved: SavedState) -> Result<Variable> {
        record_one(op, &[self], value, saved)
    }

    fn binary<F>(&self, op: &str, other: &Variable, f: F, saved: SavedState) -> Result<Variable>
    where
        F: Fn(f64, f64) -> f64,
    {
        let value = kernels::zip_with(self.value(), other.value(), f)?;
        record_one(op, &[self, other], value, saved)
    }

    /// Negates every element.
    pub fn neg(&self) -> Result<Variable> {
        self.unary("neg", self.value().mapv(|el| -el), SavedState::new())
    }

    /// Applies the *exponential* element-wise.
    pub fn exp(&self) -> Result<Variable> {
        self.unary(
            "exp",
            self.value().mapv(f64::exp),
            SavedState::new().output("result", 0),
        )
    }

    /// Applies the *natural logarithm* element-wise.
    pub fn log(&self) -> Result<Variable> {
        self.unary(
            "log",
            self.value().mapv(f64::ln),
            SavedState::new().input("self", self),
        )
    }

    pub fn sin(&self) -> Result<Variable> {
        self.unary(
            "sin",
            self.value().mapv(f64::sin),
            SavedState::new().input("self", self),
        )
    }

    pub fn cos(&self) -> Result<Variable> {
        self.unary(
            "cos",
            self.value().mapv(f64::cos),
            SavedState::new().input("self", self),
        )
    }

    /// Takes the square root element-wise.
    pub fn sqrt(&self) -> Result<Variable> {
        self.unary(
            "sqrt",
            self.value().mapv(f64::sqrt),
            SavedState::new().output("result", 0),
        )
    }

    pub fn abs(&self) -> Result<Variable> {
        self.unary(
            "abs",
            self.value().mapv(f64::abs),
            SavedState::new().input("self", self),
        )
    }

    /// Element-wise sign, `-1`, `0` or `1`.
    pub fn sign(&self) -> Result<Variable> {
        self.unary("sign", kernels::sign(self.value()), SavedState::new())
    }

    /// Applies the *sigmoid* element-wise.
    pub fn sigmoid(&self) -> Result<Variable> {
        self.unary(
            "sigmoid",
            kernels::sigmoid(self.value()),
            SavedState::new().output("result", 0),
        )
    }

    /// Applies the *tanh* element-wise.
    pub fn tanh(&self) -> Result<Variable> {
        self.unary(
            "tanh",
            self.value().mapv(f64::tanh),
            SavedState::new().output("result", 0),
        )
    }

    /// Applies the *rectified linear unit* element-wise.
    ///
    /// *ReLU(x) = max(0, x)*
    pub fn relu(&self) -> Result<Variable> {
        self.unary(
            "relu",
            kernels::relu(self.value()),
            SavedState::new().input("self", self),
        )
    }

    /// Element-wise `1 / x`.
    pub fn reciprocal(&self) -> Result<Variable> {
        self.unary(
            "reciprocal",
            self.value().mapv(f64::recip),
            SavedState::new().output("result", 0),
        )
    }

    /// Raises every element to the power `exponent`.
    pub fn pow_scalar(&self, exponent: f64) -> Result<Variable> {
        self.unary(
            "pow.Scalar",
            self.value().mapv(|el| el.powf(exponent)),
            SavedState::new()
                .input("self", self)
                .float("exponent", exponent),
        )
    }

    /// Clamps every element into `[min, max]`.
    pub fn clamp(&self, min: f64, max: f64) -> Result<Variable> {
        self.unary(
            "clamp",
            kernels::clamp(self.value(), min, max),
            SavedState::new()
                .input("self", self)
                .float("min", min)
                .float("max", max),
        )
    }

    pub fn floor(&self) -> Result<Variable> {
        self.unary("floor", self.value().mapv(f64::floor), SavedState::new())
    }

    pub fn ceil(&self) -> Result<Variable> {
        self.unary("ceil", self.value().mapv(f64::ceil), SavedState::new())
    }

    pub fn round(&self) -> Result<Variable> {
        self.unary("round", self.value().mapv(f64::round), SavedState::new())
    }

    /// Adds a scalar to every element.
    pub fn add_scalar(&self, other: f64) -> Result<Variable> {
        self.unary(
            "add.Scalar",
            self.value().mapv(|el| el + other),
            SavedState::new(),
        )
    }

    /// Multiplies every element by a scalar.
    pub fn mul_scalar(&self, other: f64) -> Result<Variable> {
        self.unary(
            "mul.Scalar",
            self.value().mapv(|el| el * other),
            SavedState::new().float("other", other),
        )
    }

    /// Element-wise sum, broadcasting the operands.
    pub fn add(&self, other: &Variable) -> Result<Variable> {
        self.binary("add", other, |l, r| l + r, SavedState::new())
    }

    /// Element-wise difference, broadcasting the operands.
    pub fn sub(&self, other: &Variable) -> Result<Variable> {
        self.binary("sub", other, |l, r| l - r, SavedState::new())
    }

    /// Element-wise product, broadcasting the operands.
    pub fn mul(&self, other: &Variable) -> Result<Variable> {
        self.binary(
            "mul",
            other,
            |l, r| l * r,
            SavedState::new().input("self", self).input("other", other),
        )
    }

    /// Element-wise quotient, broadcasting the operands.
    pub fn div(&self, other: &Variable) -> Result<Variable> {
        self.binary(
            "div",
            other,
            |l, r| l / r,
            SavedState::new().input("self", self).input("other", other),
        )
    }

    /// Element-wise four-quadrant arctangent of `self / other`.
    pub fn atan2(&self, other: &Variable) -> Result<Variable> {
        self.binary(
            "atan2",
            other,
            f64::atan2,
            SavedState::new().input("self", self).input("other", other),
        )
    }

    /// Element-wise remainder of the division, with the sign of the dividend.
    pub fn fmod(&self, other: &Variable) -> Result<Variable> {
        self.binary("fmod", other, |l, r| l % r, SavedState::new())
    }

    /// `1.0` where `self > other`, `0.0` elsewhere. Never differentiable.
    pub fn gt(&self, other: &Variable) -> Result<Variable> {
        let value = kernels::compare(self.value(), other.value(), |l, r| l > r)?;
        record_one("gt", &[self, other], value, SavedState::new())
    }

    /// `1.0` where `self < other`, `0.0` elsewhere. Never differentiable.
    pub fn lt(&self, other: &Variable) -> Result<Variable> {
        let value = kernels::compare(self.value(), other.value(), |l, r| l < r)?;
        record_one("lt", &[self, other], value, SavedState::new())
    }

    /// `1.0` where `self == other`, `0.0` elsewhere. Never differentiable.
    #[allow(clippy::float_cmp)]
    pub fn eq(&self, other: &Variable) -> Result<Variable> {
        let value = kernels::compare(self.value(), other.value(), |l, r| l == r)?;
        record_one("eq", &[self, other], value, SavedState::new())
    }

    /// A constant of zeros shaped like `self`.
    pub fn zeros_like(&self) -> Result<Variable> {
        self.unary("zeros_like", Value::zeros(self.value().raw_dim()), SavedState::new())
    }

    /// A constant of ones shaped like `self`.
    pub fn ones_like(&self) -> Result<Variable> {
        self.unary("ones_like", Value::ones(self.value().raw_dim()), SavedState::new())
    }

    /// A constant shaped like `self`, filled with samples of *U(0, 1)*.
    pub fn rand_like(&self) -> Result<Variable> {
        let value = Value::random(self.value().raw_dim(), Uniform::new(0., 1.));
        self.unary("rand_like", value, SavedState::new())
    }
}
