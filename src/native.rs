//! Call boundary for host functions.
//!
//! Arguments cross as a contiguous run of fixed-layout [`Slot`]s. Scalars are
//! bit-packed into the slot; strings and arrays travel as indices into pools
//! owned by the per-call [`Frame`]. Slots never appear inside [`Value`].

use crate::error::{ErrorKind, TemplateError};
use crate::value::{ArrayView, Range, Value};
use std::fmt;
use std::rc::Rc;

/// Size in bytes of a transfer slot
pub const SLOT_SIZE: usize = 16;

/// Fixed-layout transfer cell
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub tag: u32,
    pub aux: u32,
    pub bits: u64,
}

const _: () = assert!(std::mem::size_of::<Slot>() == SLOT_SIZE);
const _: () = assert!(std::mem::align_of::<Slot>() == 8);

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTag {
    Void = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Str = 4,
    Array = 5,
    Range = 6,
}

impl SlotTag {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SlotTag::Void),
            1 => Some(SlotTag::Bool),
            2 => Some(SlotTag::Int),
            3 => Some(SlotTag::Float),
            4 => Some(SlotTag::Str),
            5 => Some(SlotTag::Array),
            6 => Some(SlotTag::Range),
            _ => None,
        }
    }
}

impl Slot {
    fn tagged(tag: SlotTag, bits: u64) -> Self {
        Self { tag: tag as u32, aux: 0, bits }
    }

    pub fn void() -> Self {
        Self::tagged(SlotTag::Void, 0)
    }

    pub fn bool(value: bool) -> Self {
        Self::tagged(SlotTag::Bool, value as u64)
    }

    pub fn int(value: i32) -> Self {
        Self::tagged(SlotTag::Int, value as u32 as u64)
    }

    pub fn float(value: f32) -> Self {
        Self::tagged(SlotTag::Float, value.to_bits() as u64)
    }

    pub fn range(range: Range) -> Self {
        Self::tagged(SlotTag::Range, ((range.start as u32 as u64) << 32) | range.end as u32 as u64)
    }

    pub fn kind(&self) -> Option<SlotTag> {
        SlotTag::from_raw(self.tag)
    }
}

/// Arguments and pools for one host call
#[derive(Debug, Default)]
pub struct Frame<'a> {
    slots: Vec<Slot>,
    strings: Vec<String>,
    arrays: Vec<ArrayView<'a>>,
}

impl<'a> Frame<'a> {
    /// Pack evaluated arguments into slots
    pub fn encode(args: &[Value<'a>]) -> Result<Self, TemplateError> {
        let mut frame = Frame::default();
        for (position, value) in args.iter().enumerate() {
            let slot = match value {
                Value::Void => Slot::void(),
                Value::Bool(b) => Slot::bool(*b),
                Value::Int(i) => Slot::int(*i),
                Value::Float(f) => Slot::float(*f),
                Value::Range(r) => Slot::range(*r),
                Value::String(s) => frame.push_str(s.as_str()),
                Value::Array(view) => frame.push_array(*view),
                Value::ForSource(_) | Value::Function(_) => {
                    return Err(TemplateError::bare(
                        ErrorKind::TypeMismatch,
                        format!(
                            "Argument {} is a {}, which cannot be passed to a host function.",
                            position + 1,
                            value.kind_name()
                        ),
                    ));
                }
            };
            frame.slots.push(slot);
        }
        Ok(frame)
    }

    /// Argument slots in call order
    pub fn args(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn arg(&self, index: usize, expected: SlotTag) -> Result<Slot, String> {
        let slot = self
            .slots
            .get(index)
            .copied()
            .ok_or_else(|| format!("missing argument {} (got {})", index + 1, self.slots.len()))?;
        if slot.kind() != Some(expected) {
            return Err(format!(
                "argument {} should be {:?}, got tag {}",
                index + 1,
                expected,
                slot.tag
            ));
        }
        Ok(slot)
    }

    /// Bool argument; an Int argument equal to 1 also counts as true
    pub fn bool_arg(&self, index: usize) -> Result<bool, String> {
        match self.slots.get(index).and_then(Slot::kind) {
            Some(SlotTag::Int) => Ok(self.int_arg(index)? == 1),
            _ => Ok(self.arg(index, SlotTag::Bool)?.bits != 0),
        }
    }

    pub fn int_arg(&self, index: usize) -> Result<i32, String> {
        Ok(self.arg(index, SlotTag::Int)?.bits as u32 as i32)
    }

    pub fn float_arg(&self, index: usize) -> Result<f32, String> {
        Ok(f32::from_bits(self.arg(index, SlotTag::Float)?.bits as u32))
    }

    pub fn str_arg(&self, index: usize) -> Result<&str, String> {
        let slot = self.arg(index, SlotTag::Str)?;
        self.strings
            .get(slot.bits as usize)
            .map(String::as_str)
            .ok_or_else(|| format!("argument {} names a missing string", index + 1))
    }

    pub fn array_arg(&self, index: usize) -> Result<ArrayView<'a>, String> {
        let slot = self.arg(index, SlotTag::Array)?;
        self.arrays
            .get(slot.bits as usize)
            .copied()
            .ok_or_else(|| format!("argument {} names a missing array", index + 1))
    }

    pub fn range_arg(&self, index: usize) -> Result<Range, String> {
        let bits = self.arg(index, SlotTag::Range)?.bits;
        Ok(Range::new((bits >> 32) as u32 as i32, bits as u32 as i32))
    }

    /// Store a string in the frame and return the slot that refers to it
    pub fn push_str(&mut self, text: impl Into<String>) -> Slot {
        self.strings.push(text.into());
        Slot::tagged(SlotTag::Str, (self.strings.len() - 1) as u64)
    }

    pub fn push_array(&mut self, view: ArrayView<'a>) -> Slot {
        self.arrays.push(view);
        Slot::tagged(SlotTag::Array, (self.arrays.len() - 1) as u64)
    }

    /// Turn a returned slot back into a value, validating tag and pool index
    pub fn decode(&self, slot: Slot) -> Result<Value<'a>, TemplateError> {
        let malformed = |what: String| TemplateError::bare(ErrorKind::NativeCall, format!("Malformed return slot: {}.", what));
        let tag = slot.kind().ok_or_else(|| malformed(format!("unknown tag {}", slot.tag)))?;

        match tag {
            SlotTag::Void => Ok(Value::Void),
            SlotTag::Bool => match slot.bits {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(malformed(format!("bool payload {}", other))),
            },
            SlotTag::Int => Ok(Value::Int(slot.bits as u32 as i32)),
            SlotTag::Float => Ok(Value::Float(f32::from_bits(slot.bits as u32))),
            SlotTag::Range => Ok(Value::Range(Range::new((slot.bits >> 32) as u32 as i32, slot.bits as u32 as i32))),
            SlotTag::Str => self
                .strings
                .get(slot.bits as usize)
                .map(|s| Value::String(s.clone()))
                .ok_or_else(|| malformed(format!("string index {}", slot.bits))),
            SlotTag::Array => self
                .arrays
                .get(slot.bits as usize)
                .map(|view| Value::Array(*view))
                .ok_or_else(|| malformed(format!("array index {}", slot.bits))),
        }
    }
}

type HostFn = dyn for<'a> Fn(&mut Frame<'a>) -> Result<Slot, String>;

/// Host callback stored in the symbol table
#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    func: Rc<HostFn>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: for<'a> Fn(&mut Frame<'a>) -> Result<Slot, String> + 'static,
    {
        Self { name: Rc::from(name), func: Rc::new(func) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encode `args`, run the host function and decode its result
    pub fn call<'a>(&self, args: &[Value<'a>]) -> Result<Value<'a>, TemplateError> {
        let mut frame = Frame::encode(args)?;
        log::trace!("calling host function '{}' with {} argument(s)", self.name, frame.len());

        let slot = (self.func)(&mut frame).map_err(|message| {
            TemplateError::bare(
                ErrorKind::NativeCall,
                format!("Host function '{}' failed: {}", self.name, message),
            )
        })?;
        frame.decode(slot)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add() -> NativeFunction {
        NativeFunction::new("add", |frame| Ok(Slot::int(frame.int_arg(0)? + frame.int_arg(1)?)))
    }

    #[test]
    fn test_slot_layout() {
        assert_eq!(std::mem::size_of::<Slot>(), SLOT_SIZE);
        assert_eq!(Slot::int(-1).bits, 0xFFFF_FFFF);
        assert_eq!(Slot::float(1.0).bits, 0x3F80_0000);
    }

    #[test]
    fn test_scalar_call() {
        let result = add().call(&[Value::Int(2), Value::Int(-5)]).unwrap();
        assert_eq!(result, Value::Int(-3));
    }

    #[test]
    fn test_string_round_trip_through_pool() {
        let vec = NativeFunction::new("vec", |frame| {
            let text = format!("vec{}({})", frame.len(), frame.str_arg(0)?);
            Ok(frame.push_str(text))
        });
        let result = vec.call(&[Value::from("x")]).unwrap();
        assert_eq!(result, Value::String("vec1(x)".to_string()));
    }

    #[test]
    fn test_array_and_range_args() {
        let data = [3, 4, 5];
        let view = ArrayView::ints(&data, &[3]).unwrap();
        let sum = NativeFunction::new("sum", |frame| {
            let array = frame.array_arg(0)?;
            let range = frame.range_arg(1)?;
            let mut total = 0;
            for i in range.iter() {
                if let Ok(crate::value::Scalar::Int(v)) = array.get_flat(i as usize) {
                    total += v;
                }
            }
            Ok(Slot::int(total))
        });
        let result = sum.call(&[Value::Array(view), Value::Range(Range::new(1, 3))]).unwrap();
        assert_eq!(result, Value::Int(9));
    }

    #[test]
    fn test_bool_arg_accepts_one() {
        let flag = NativeFunction::new("flag", |frame| Ok(Slot::bool(frame.bool_arg(0)?)));
        assert_eq!(flag.call(&[Value::Int(1)]).unwrap(), Value::Bool(true));
        assert_eq!(flag.call(&[Value::Int(2)]).unwrap(), Value::Bool(false));
        assert_eq!(flag.call(&[Value::Bool(true)]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_host_error_is_native_call() {
        let err = add().call(&[Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NativeCall);
        assert!(err.message.contains("add"));

        let err = add().call(&[Value::Float(1.0), Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NativeCall);
    }

    #[test]
    fn test_functions_are_not_arguments() {
        let err = add().call(&[Value::Function(add()), Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_malformed_return_slots() {
        let bad_tag = NativeFunction::new("bad", |_| Ok(Slot { tag: 99, aux: 0, bits: 0 }));
        assert_eq!(bad_tag.call(&[]).unwrap_err().kind, ErrorKind::NativeCall);

        let dangling = NativeFunction::new("dangling", |_| Ok(Slot { tag: SlotTag::Str as u32, aux: 0, bits: 7 }));
        assert_eq!(dangling.call(&[]).unwrap_err().kind, ErrorKind::NativeCall);
    }

    #[test]
    fn test_range_slot_keeps_sign() {
        let frame = Frame::encode(&[Value::Range(Range::new(-2, 3))]).unwrap();
        assert_eq!(frame.range_arg(0).unwrap(), Range::new(-2, 3));
    }
}
