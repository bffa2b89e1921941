//! Worker-side task lookup and the request loop.

use super::protocol::{self, Reply, Request, Response};
use crate::error::Result;
use crate::executor::catch_panic;
use crate::task_fn::RemoteTask;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::marker::PhantomData;

/// Type-erased task that can be stored in a registry.
trait ErasedTask: Send + Sync {
    fn call_erased(&self, item: Value, args: Value) -> Reply;
}

struct Exported<F, I, A> {
    task: F,
    _marker: PhantomData<fn(I, A)>,
}

impl<F, I, A> ErasedTask for Exported<F, I, A>
where
    F: RemoteTask<I, A>,
    I: DeserializeOwned,
    A: DeserializeOwned,
    F::Output: Serialize,
    F::Error: Serialize,
{
    fn call_erased(&self, item: Value, args: Value) -> Reply {
        let item: I = match serde_json::from_value(item) {
            Ok(item) => item,
            Err(e) => return Reply::Transfer(format!("decoding item: {}", e)),
        };
        let args: A = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Reply::Transfer(format!("decoding args: {}", e)),
        };

        match catch_panic(|| self.task.call(item, &args)) {
            Ok(Ok(value)) => match serde_json::to_value(value) {
                Ok(value) => Reply::Ok(value),
                Err(e) => Reply::Transfer(format!("encoding result: {}", e)),
            },
            Ok(Err(err)) => match serde_json::to_value(err) {
                Ok(err) => Reply::Err(err),
                Err(e) => Reply::Transfer(format!("encoding error: {}", e)),
            },
            Err(panic) => Reply::Panic(panic),
        }
    }
}

/// Tasks a worker process can run, by name.
#[derive(Default)]
pub struct Registry {
    tasks: HashMap<&'static str, Box<dyn ErasedTask>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, I, A>(mut self, task: F) -> Self
    where
        F: RemoteTask<I, A>,
        I: DeserializeOwned + 'static,
        A: DeserializeOwned + 'static,
        F::Output: Serialize,
        F::Error: Serialize,
    {
        let name = task.name();
        let exported = Exported {
            task,
            _marker: PhantomData,
        };
        if self.tasks.insert(name, Box::new(exported)).is_some() {
            tracing::warn!(task = name, "task registered twice; keeping the last one");
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Answer requests from `input` on `output` until `input` is exhausted.
    ///
    /// Returns the number of requests served.
    pub fn serve<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> Result<usize> {
        let mut served = 0;

        while let Some(request) = protocol::read_frame::<_, Request>(&mut input)? {
            let reply = match self.tasks.get(request.task.as_str()) {
                Some(task) => task.call_erased(request.item, request.args),
                None => Reply::Transfer(format!("no task registered as `{}`", request.task)),
            };

            protocol::write_frame(
                &mut output,
                &Response {
                    id: request.id,
                    reply,
                },
            )?;
            served += 1;
        }

        Ok(served)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tasks.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("tasks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::protocol::FRAME_MARKER;
    use crate::task_fn::RemoteFn;
    use serde::Deserialize;
    use serde_json::json;
    use std::io::Cursor;

    #[derive(Debug, Serialize, Deserialize)]
    enum MathError {
        Negative(i64),
    }

    fn sqrt(x: i64, _: &()) -> std::result::Result<i64, MathError> {
        if x < 0 {
            return Err(MathError::Negative(x));
        }
        if x == 99 {
            panic!("unlucky");
        }
        Ok((x as f64).sqrt() as i64)
    }

    const SQRT: RemoteFn<i64, (), i64, MathError> = RemoteFn::new("sqrt", sqrt);

    fn requests(items: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (id, item) in items.iter().enumerate() {
            protocol::write_frame(
                &mut buf,
                &Request {
                    id: id as u64,
                    task: "sqrt".into(),
                    item: item.clone(),
                    args: Value::Null,
                },
            )
            .unwrap();
        }
        buf
    }

    fn replies(output: Vec<u8>) -> Vec<Reply> {
        let mut reader = Cursor::new(output);
        let mut replies = Vec::new();
        while let Some(response) = protocol::read_frame::<_, Response>(&mut reader).unwrap() {
            replies.push(response.reply);
        }
        replies
    }

    #[test]
    fn test_serve_answers_every_request() {
        let registry = Registry::new().register(SQRT);
        let input = requests(&[json!(16), json!(-4), json!(99), json!("nope")]);
        let mut output = Vec::new();

        let served = registry.serve(Cursor::new(input), &mut output).unwrap();
        assert_eq!(served, 4);

        let replies = replies(output);
        assert_eq!(replies[0], Reply::Ok(json!(4)));
        assert_eq!(replies[1], Reply::Err(json!({"Negative": -4})));
        assert!(matches!(&replies[2], Reply::Panic(p) if p.message == "unlucky"));
        assert!(matches!(&replies[3], Reply::Transfer(msg) if msg.starts_with("decoding item")));
    }

    #[test]
    fn test_unknown_task_is_a_transfer_failure() {
        let registry = Registry::new();
        let input = format!(
            "{}{}\n",
            FRAME_MARKER,
            json!({"id": 1, "task": "missing", "item": 1, "args": null})
        );
        let mut output = Vec::new();

        registry.serve(Cursor::new(input.into_bytes()), &mut output).unwrap();
        assert!(matches!(&replies(output)[0], Reply::Transfer(msg) if msg.contains("missing")));
    }

    #[test]
    fn test_register_by_name() {
        let registry = Registry::new().register(SQRT);
        assert!(registry.contains("sqrt"));
        assert_eq!(registry.len(), 1);
    }
}
