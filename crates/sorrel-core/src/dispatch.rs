use std::sync::Arc;

use crate::error::SorrelError;
use crate::seq::{self, SeqRef};
use crate::value::{FnArity, NativeFn, Value};

/// Extras beyond this many are kept behind a sequence view instead of being
/// spilled into eager cons cells.
const EAGER_REST_MAX: usize = 4;

type VariadicBody = Box<dyn Fn(&[Value], Option<SeqRef>) -> Result<Value, SorrelError> + Send + Sync>;

/// Guest function with `required` leading positional parameters and a
/// trailing rest parameter.
///
/// Every entry point funnels into one canonical body call
/// `(fixed, rest)`, where `rest` is `None` when exactly `required` arguments
/// were supplied and a non-empty sequence of the extras, in call order,
/// otherwise. Instances hold no mutable state; concurrent invocation needs no
/// synchronization.
pub struct VariadicFn {
    required: usize,
    body: VariadicBody,
    debug_name: Option<Arc<str>>,
}

impl VariadicFn {
    pub fn new(
        required: usize,
        body: impl Fn(&[Value], Option<SeqRef>) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            required,
            body: Box::new(body),
            debug_name: None,
        }
    }

    pub fn with_name(
        required: usize,
        name: impl Into<String>,
        body: impl Fn(&[Value], Option<SeqRef>) -> Result<Value, SorrelError> + Send + Sync + 'static,
    ) -> Self {
        let mut vf = Self::new(required, body);
        vf.debug_name = Some(name.into().into());
        vf
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn arity(&self) -> FnArity {
        FnArity::at_least(self.required)
    }

    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    pub fn invoke1(&self, a1: Value) -> Result<Value, SorrelError> {
        self.invoke(&[a1])
    }

    pub fn invoke2(&self, a1: Value, a2: Value) -> Result<Value, SorrelError> {
        self.invoke(&[a1, a2])
    }

    pub fn invoke3(&self, a1: Value, a2: Value, a3: Value) -> Result<Value, SorrelError> {
        self.invoke(&[a1, a2, a3])
    }

    pub fn invoke4(
        &self,
        a1: Value,
        a2: Value,
        a3: Value,
        a4: Value,
    ) -> Result<Value, SorrelError> {
        self.invoke(&[a1, a2, a3, a4])
    }

    pub fn invoke5(
        &self,
        a1: Value,
        a2: Value,
        a3: Value,
        a4: Value,
        a5: Value,
    ) -> Result<Value, SorrelError> {
        self.invoke(&[a1, a2, a3, a4, a5])
    }

    /// Direct call with five leading values plus an open-ended ordered tail
    /// of further values. The extras among the leading five are merged with
    /// the tail by prepending onto a sequence view of it, preserving order.
    pub fn invoke_more(
        &self,
        a1: Value,
        a2: Value,
        a3: Value,
        a4: Value,
        a5: Value,
        more: &[Value],
    ) -> Result<Value, SorrelError> {
        let lead = [a1, a2, a3, a4, a5];
        if self.required <= lead.len() {
            let (fixed, extra) = lead.split_at(self.required);
            let rest = seq::list_star(extra, seq::from_slice(more));
            (self.body)(fixed, rest)
        } else {
            let mut args = Vec::with_capacity(lead.len() + more.len());
            args.extend(lead);
            args.extend_from_slice(more);
            self.invoke(&args)
        }
    }

    /// General direct-call path over an argument slice of any length.
    /// Exactly `required` arguments reach the body with an absent rest and no
    /// allocation.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, SorrelError> {
        if args.len() < self.required {
            return Err(arity_error(self.arity(), args.len()));
        }
        let (fixed, extra) = args.split_at(self.required);
        let rest = if extra.len() <= EAGER_REST_MAX {
            seq::list(extra)
        } else {
            let (eager, deferred) = extra.split_at(EAGER_REST_MAX);
            seq::list_star(eager, seq::from_slice(deferred))
        };
        (self.body)(fixed, rest)
    }

    /// Generic entry point over an argument sequence of any length.
    ///
    /// The bounded probe counts at most `required + 1` elements, so infinite
    /// or expensive sequences dispatch in O(required); the tail handed to the
    /// body comes from the sequence's own `rest` chain without re-copying.
    pub fn apply_to(&self, args: Option<SeqRef>) -> Result<Value, SorrelError> {
        let required = self.required;
        let available = seq::bounded_length(args.as_ref(), required)?;
        if available < required {
            return Err(arity_error(self.arity(), available));
        }
        let mut fixed = Vec::with_capacity(required);
        let mut cursor = args;
        for _ in 0..required {
            let node = cursor
                .ok_or_else(|| SorrelError::runtime("argument sequence ended during dispatch"))?;
            fixed.push(node.first()?);
            cursor = node.rest()?;
        }
        if available == required {
            (self.body)(&fixed, None)
        } else {
            (self.body)(&fixed, cursor)
        }
    }
}

pub(crate) enum ArityCheck {
    Call,
    NeedMore,
    TooMany,
}

pub(crate) fn check_arity(arity: FnArity, provided: usize) -> ArityCheck {
    if provided < arity.min() {
        return ArityCheck::NeedMore;
    }
    if let Some(max) = arity.max() {
        if provided > max {
            return ArityCheck::TooMany;
        }
    }
    ArityCheck::Call
}

pub fn arity_error(arity: FnArity, provided: usize) -> SorrelError {
    match arity.max() {
        Some(max) if arity.min() == max => {
            SorrelError::arity(format!("expected {} args, got {}", max, provided))
        }
        Some(max) => SorrelError::arity(format!(
            "expected between {} and {} args, got {}",
            arity.min(),
            max,
            provided
        )),
        None => SorrelError::arity(format!(
            "expected at least {} args, got {}",
            arity.min(),
            provided
        )),
    }
}

pub fn call_native_fn(func: &NativeFn, args: &[Value]) -> Result<Value, SorrelError> {
    match check_arity(func.arity(), args.len()) {
        ArityCheck::Call => func.call(args),
        ArityCheck::NeedMore | ArityCheck::TooMany => Err(arity_error(func.arity(), args.len())),
    }
}

pub fn call_callable(callable: &Value, args: &[Value]) -> Result<Value, SorrelError> {
    match callable {
        Value::Func(func) => call_native_fn(func, args),
        Value::Variadic(func) => func.invoke(args),
        other => Err(SorrelError::type_mismatch("callable", other.type_name())),
    }
}

/// Applies a callable to leading arguments plus a final seqable argument
/// whose elements are spread onto the call. Variadic callees enter through
/// the sequence path without materializing the tail; fixed-arity natives
/// must realize it.
pub fn apply_callable(callable: &Value, lead: &[Value], tail: &Value) -> Result<Value, SorrelError> {
    let tail_seq = seq::seq(tail)?;
    match callable {
        Value::Variadic(func) => func.apply_to(seq::list_star(lead, tail_seq)),
        Value::Func(func) => {
            let mut args = lead.to_vec();
            args.extend(seq::collect(tail_seq.as_ref())?);
            call_native_fn(func, &args)
        }
        other => Err(SorrelError::type_mismatch("callable", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::Seq;
    use std::sync::Mutex;

    type Observed = (Vec<Value>, Option<Vec<Value>>);

    /// Variadic function whose body records the canonical `(fixed, rest)`
    /// pair it receives, realizing the rest sequence.
    fn recording(required: usize) -> (Arc<Mutex<Vec<Observed>>>, VariadicFn) {
        let log: Arc<Mutex<Vec<Observed>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let func = VariadicFn::new(required, move |fixed, rest| {
            let realized = match &rest {
                Some(seq) => Some(seq::collect(Some(seq))?.into_iter().collect()),
                None => None,
            };
            sink.lock().unwrap().push((fixed.to_vec(), realized));
            Ok(Value::Nil)
        });
        (log, func)
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    fn observed(log: &Arc<Mutex<Vec<Observed>>>) -> Observed {
        log.lock().unwrap().last().cloned().expect("body was called")
    }

    #[test]
    fn advertised_arity_is_open_ended() {
        let (_, func) = recording(2);
        assert_eq!(func.required(), 2);
        assert_eq!(func.arity(), FnArity::at_least(2));
        assert_eq!(func.debug_name(), None);
        let named = VariadicFn::with_name(1, "sum", |_, _| Ok(Value::Nil));
        assert_eq!(named.debug_name(), Some("sum"));
    }

    #[test]
    fn exact_arity_passes_absent_rest() {
        let (log, func) = recording(1);
        func.invoke1(Value::Int(5)).unwrap();
        assert_eq!(observed(&log), (ints(&[5]), None));
    }

    #[test]
    fn one_extra_becomes_single_element_rest() {
        let (log, func) = recording(1);
        func.invoke2(Value::Int(5), Value::Int(6)).unwrap();
        assert_eq!(observed(&log), (ints(&[5]), Some(ints(&[6]))));
    }

    #[test]
    fn four_extras_keep_call_order() {
        let (log, func) = recording(1);
        func.invoke5(
            Value::Int(5),
            Value::Int(6),
            Value::Int(7),
            Value::Int(8),
            Value::Int(9),
        )
        .unwrap();
        assert_eq!(observed(&log), (ints(&[5]), Some(ints(&[6, 7, 8, 9]))));
    }

    #[test]
    fn open_ended_tail_merges_after_the_leading_extras() {
        let (log, func) = recording(1);
        func.invoke_more(
            Value::Int(5),
            Value::Int(6),
            Value::Int(7),
            Value::Int(8),
            Value::Int(9),
            &ints(&[10, 11]),
        )
        .unwrap();
        assert_eq!(
            observed(&log),
            (ints(&[5]), Some(ints(&[6, 7, 8, 9, 10, 11])))
        );
    }

    #[test]
    fn open_ended_tail_with_no_extras_is_absent() {
        let (log, func) = recording(5);
        func.invoke_more(
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4),
            Value::Int(5),
            &[],
        )
        .unwrap();
        assert_eq!(observed(&log), (ints(&[1, 2, 3, 4, 5]), None));
    }

    #[test]
    fn more_than_five_required_takes_the_slice_path() {
        let (log, func) = recording(6);
        func.invoke_more(
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4),
            Value::Int(5),
            &ints(&[6, 7]),
        )
        .unwrap();
        assert_eq!(observed(&log), (ints(&[1, 2, 3, 4, 5, 6]), Some(ints(&[7]))));
    }

    #[test]
    fn apply_to_exact_arity_is_absent() {
        let (log, func) = recording(1);
        func.apply_to(seq::list(&ints(&[5]))).unwrap();
        assert_eq!(observed(&log), (ints(&[5]), None));
    }

    #[test]
    fn apply_to_passes_the_remaining_tail() {
        let (log, func) = recording(1);
        func.apply_to(seq::list(&ints(&[5, 6, 7]))).unwrap();
        assert_eq!(observed(&log), (ints(&[5]), Some(ints(&[6, 7]))));
    }

    #[test]
    fn zero_required_accepts_the_empty_call() {
        let (log, func) = recording(0);
        func.invoke(&[]).unwrap();
        assert_eq!(observed(&log), (vec![], None));
        func.apply_to(None).unwrap();
        assert_eq!(observed(&log), (vec![], None));
        func.invoke1(Value::Int(1)).unwrap();
        assert_eq!(observed(&log), (vec![], Some(ints(&[1]))));
    }

    #[test]
    fn direct_and_generic_entry_points_agree() {
        for total in 1..=8 {
            let values = ints(&(1..=total).collect::<Vec<i64>>());
            let (direct_log, func) = recording(1);
            func.invoke(&values).unwrap();
            let (seq_log, func) = recording(1);
            func.apply_to(seq::list(&values)).unwrap();
            assert_eq!(observed(&direct_log), observed(&seq_log));
        }
    }

    #[test]
    fn underflow_fails_fast_with_counts() {
        let (_, func) = recording(2);
        let err = func.invoke1(Value::Int(5)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Arity mismatch: expected at least 2 args, got 1"
        );
        let err = func.apply_to(None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Arity mismatch: expected at least 2 args, got 0"
        );
    }

    struct FailingTail;

    impl Seq for FailingTail {
        fn first(&self) -> Result<Value, SorrelError> {
            Err(SorrelError::runtime("head must not be realized"))
        }

        fn rest(&self) -> Result<Option<SeqRef>, SorrelError> {
            Err(SorrelError::runtime("tail must not be traversed"))
        }
    }

    #[test]
    fn probe_never_advances_past_required_plus_one() {
        // Body ignores the rest entirely, so the poisoned third node must
        // never have first or rest called on it.
        let func = VariadicFn::new(1, |fixed, rest| {
            assert!(rest.is_some());
            Ok(fixed[0].clone())
        });
        let poisoned: SeqRef = Arc::new(FailingTail);
        let args = seq::list_star(&ints(&[5, 6]), Some(poisoned));
        assert_eq!(func.apply_to(args).unwrap(), Value::Int(5));
    }

    #[test]
    fn guest_body_failures_propagate_unchanged() {
        let func = VariadicFn::new(1, |_, _| Err(SorrelError::message("guest failure")));
        let err = func.invoke1(Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "Message: guest failure");
    }

    #[test]
    fn call_callable_dispatches_on_kind() {
        let native = Value::Func(Arc::new(NativeFn::new(FnArity::exact(1), |args| {
            Ok(args[0].clone())
        })));
        assert_eq!(
            call_callable(&native, &[Value::Int(3)]).unwrap(),
            Value::Int(3)
        );
        let (_, func) = recording(1);
        let variadic = Value::Variadic(Arc::new(func));
        assert_eq!(
            call_callable(&variadic, &ints(&[1, 2])).unwrap(),
            Value::Nil
        );
        let err = call_callable(&Value::Int(1), &[]).unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected callable, got number");
    }

    #[test]
    fn native_arity_is_enforced() {
        let native = NativeFn::new(FnArity::range(1, 2), |args| Ok(args[0].clone()));
        assert!(call_native_fn(&native, &ints(&[1])).is_ok());
        let err = call_native_fn(&native, &ints(&[1, 2, 3])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Arity mismatch: expected between 1 and 2 args, got 3"
        );
        let exact = NativeFn::new(FnArity::exact(2), |args| Ok(args[1].clone()));
        let err = call_native_fn(&exact, &ints(&[1])).unwrap_err();
        assert_eq!(err.to_string(), "Arity mismatch: expected 2 args, got 1");
    }

    #[test]
    fn apply_spreads_the_final_argument() {
        let (log, func) = recording(1);
        let callable = Value::Variadic(Arc::new(func));
        let tail: im::Vector<Value> = ints(&[8, 9]).into_iter().collect();
        apply_callable(&callable, &ints(&[5]), &Value::Vector(tail)).unwrap();
        assert_eq!(observed(&log), (ints(&[5]), Some(ints(&[8, 9]))));
    }

    #[test]
    fn apply_with_nil_tail_is_exact_arity() {
        let (log, func) = recording(1);
        let callable = Value::Variadic(Arc::new(func));
        apply_callable(&callable, &ints(&[5]), &Value::Nil).unwrap();
        assert_eq!(observed(&log), (ints(&[5]), None));
    }
}
