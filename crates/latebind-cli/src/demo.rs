//! The object the CLI serves

use std::sync::Arc;

use parking_lot::Mutex;

use latebind::{
    ConversionRegistry, Currency, Date, DispatchObject, MemberError, Status, Value,
};

const ITEMS: [&str; 3] = ["alpha", "beta", "gamma"];

fn number(frame_arg: Value) -> Result<Value, MemberError> {
    match frame_arg {
        Value::F32(_) | Value::F64(_) | Value::Currency(_) => frame_arg
            .as_f64()
            .map(Value::F64)
            .ok_or(MemberError::Status(Status::TypeMismatch)),
        other => other
            .as_i64()
            .map(Value::I64)
            .ok_or(MemberError::Status(Status::TypeMismatch)),
    }
}

/// Build the demo object: arithmetic, a counter property, a price, the
/// current date, and a small collection of names.
pub fn build(registry: &Arc<ConversionRegistry>) -> Arc<DispatchObject> {
    let counter = Arc::new(Mutex::new(0i64));
    let read = Arc::clone(&counter);
    let write = Arc::clone(&counter);

    DispatchObject::builder("Demo", Arc::clone(registry))
        .getter("Name", 0, |_| Ok(Value::string("latebind demo")))
        .method("Add", 2, |frame| {
            match (number(frame.arg(0)?)?, number(frame.arg(1)?)?) {
                (Value::I64(a), Value::I64(b)) => a
                    .checked_add(b)
                    .map(Value::I64)
                    .ok_or_else(|| MemberError::raise("integer overflow")),
                (a, b) => {
                    let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                    Ok(Value::F64(a + b))
                }
            }
        })
        .method("Divide", 2, |frame| {
            let a = frame.arg(0)?.as_f64().ok_or(Status::TypeMismatch)?;
            let b = frame.arg(1)?.as_f64().ok_or(Status::TypeMismatch)?;
            if b == 0.0 {
                return Err(MemberError::raise("division by zero"));
            }
            Ok(Value::F64(a / b))
        })
        .variadic("Concat", |frame| {
            let mut joined = String::new();
            for index in 0..frame.len() {
                joined.push_str(&frame.arg(index)?.to_string());
            }
            Ok(Value::string(joined))
        })
        .getter("Counter", 0, move |_| Ok(Value::I64(*read.lock())))
        .setter("Counter", 0, move |frame| {
            let n = frame.value()?.as_i64().ok_or(Status::TypeMismatch)?;
            *write.lock() = n;
            Ok(Value::Empty)
        })
        .getter("Price", 0, |_| Ok(Value::Currency(Currency::new(5, 2500))))
        .getter("Today", 0, |_| {
            let now = chrono::Local::now().naive_local();
            Ok(Value::Date(Date::from_datetime(now)?))
        })
        .getter("Count", 0, |_| Ok(Value::I32(ITEMS.len() as i32)))
        .getter("Item", 1, |frame| {
            let index = frame.arg(0)?.as_i64().ok_or(Status::TypeMismatch)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| ITEMS.get(i))
                .map(|name| Value::string(*name))
                .ok_or_else(|| {
                    MemberError::raise_from(
                        Status::InvalidArgument.code(),
                        "Demo.Item",
                        format!("index {} is out of range 1..={}", index, ITEMS.len()),
                    )
                })
        })
        .collection(|_| Ok(ITEMS.iter().map(|name| Value::string(*name)).collect()))
        .build()
}
