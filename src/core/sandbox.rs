//! Disposable script sandbox
//!
//! Every evaluation builds a brand-new JavaScript context, runs one script
//! against one payload and throws the context away. Nothing survives between
//! calls, so a malformed or hostile rule cannot poison later evaluations and
//! concurrent evaluations on different threads never share an engine.
//!
//! # Bindings
//!
//! Scripts see exactly two things besides the language built-ins:
//! - `data`: read-only string holding the payload
//! - `print(...)`: appends a line to the capture buffer
//!
//! # Result channel
//!
//! The returned string is the capture buffer when anything was printed,
//! otherwise the value of the script's last expression. A context that fails
//! to initialize or a script that throws at top level yields the error message
//! instead; callers treat anything that does not parse as "no result".

use boa_engine::{js_string, property::Attribute, Context, JsString, JsValue, Source};
use tracing::debug;

use super::assembler::Script;

/// Installs `print` and the hidden reader for the capture buffer
const OUTPUT_BINDING: &str = r#"(function () {
  const lines = [];
  Object.defineProperty(globalThis, "print", {
    value: function (...args) {
      lines.push(args.map((arg) => String(arg)).join(" "));
    },
    writable: false,
    configurable: false,
    enumerable: false,
  });
  Object.defineProperty(globalThis, "__captured", {
    value: function () {
      return lines.join("\n");
    },
    writable: false,
    configurable: false,
    enumerable: false,
  });
})();
"#;

/// Execution bounds applied to every evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Maximum iterations of any single loop
    pub loop_iteration_limit: u64,
    /// Maximum call depth
    pub recursion_limit: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
        }
    }
}

/// Runs assembled scripts in throwaway contexts
///
/// The sandbox itself is plain configuration and is `Copy`, so every worker
/// thread can hold its own without locking.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptSandbox {
    limits: SandboxLimits,
}

impl ScriptSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// Evaluate `script` with `payload` bound to `data`
    ///
    /// Never fails: errors come back as their message text.
    pub fn evaluate(&self, script: &Script, payload: &str) -> String {
        match self.run(script.source(), payload) {
            Ok(output) => output,
            Err(message) => {
                debug!(error = %message, "script evaluation failed");
                message
            }
        }
    }

    fn run(&self, source: &str, payload: &str) -> Result<String, String> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.limits.loop_iteration_limit);
        context
            .runtime_limits_mut()
            .set_recursion_limit(self.limits.recursion_limit);

        context
            .register_global_property(
                js_string!("data"),
                JsString::from(payload),
                Attribute::READONLY | Attribute::NON_ENUMERABLE | Attribute::PERMANENT,
            )
            .map_err(|e| e.to_string())?;
        context
            .eval(Source::from_bytes(OUTPUT_BINDING))
            .map_err(|e| e.to_string())?;

        let last = context
            .eval(Source::from_bytes(source))
            .map_err(|e| e.to_string())?;

        let captured = context
            .eval(Source::from_bytes("__captured()"))
            .map_err(|e| e.to_string())?;
        let captured = display(&captured, &mut context)?;
        if !captured.is_empty() {
            return Ok(captured);
        }

        if last.is_undefined() {
            return Ok(String::new());
        }
        display(&last, &mut context)
    }
}

fn display(value: &JsValue, context: &mut Context) -> Result<String, String> {
    value
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn run(source: &str, payload: &str) -> String {
        ScriptSandbox::default().evaluate(&Script::raw(source), payload)
    }

    #[test]
    fn test_payload_is_bound_to_data() {
        assert_eq!(run("print(data.toUpperCase())", "hello"), "HELLO");
    }

    #[test]
    fn test_printed_output_wins_over_last_expression() {
        assert_eq!(run("print('a'); print('b', 1); 42", ""), "a\nb 1");
    }

    #[rstest]
    #[case::number("40 + 2", "42")]
    #[case::string("'x' + data", "xy")]
    #[case::undefined("undefined", "")]
    fn test_last_expression_without_output(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(run(source, "y"), expected);
    }

    #[test]
    fn test_top_level_failure_returns_message() {
        let output = run("throw new Error('boom')", "");
        assert!(output.contains("boom"), "got: {}", output);
    }

    #[test]
    fn test_syntax_error_returns_message() {
        let output = run("function (", "");
        assert!(!output.is_empty());
        assert!(serde_json::from_str::<serde_json::Value>(&output).is_err());
    }

    #[test]
    fn test_data_is_read_only() {
        assert_eq!(run("data = 'changed'; print(data)", "original"), "original");
    }

    #[test]
    fn test_no_state_survives_between_evaluations() {
        let sandbox = ScriptSandbox::default();
        sandbox.evaluate(&Script::raw("globalThis.leak = 'secret'; print('set')"), "");
        let output = sandbox.evaluate(&Script::raw("print(typeof leak)"), "");
        assert_eq!(output, "undefined");
    }

    #[test]
    fn test_runaway_loop_is_stopped() {
        let sandbox = ScriptSandbox::new(SandboxLimits {
            loop_iteration_limit: 1_000,
            recursion_limit: 64,
        });
        let output = sandbox.evaluate(&Script::raw("while (true) {} ; print('done')"), "");
        assert_ne!(output, "done");
    }

    #[test]
    fn test_concurrent_evaluations_are_isolated() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    let sandbox = ScriptSandbox::default();
                    sandbox.evaluate(
                        &Script::raw("globalThis.counter = (globalThis.counter || 0) + 1; print(data + ':' + counter)"),
                        &i.to_string(),
                    )
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), format!("{}:1", i));
        }
    }
}
