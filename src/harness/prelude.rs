//! Script rendering of the harness capabilities
//!
//! Script hosts run `prelude + driver` as a single program. The prelude
//! installs the harness globals; the driver evaluates the precondition and
//! the fixture body through indirect `eval` (global code semantics) and
//! writes exactly one terminal record to stdout:
//!
//! ```text
//! ##harness {"kind":"done"}
//! ##harness {"kind":"skip","precondition":"..."}
//! ##harness {"kind":"assertion","source":"error","message":"..."}
//! ##harness {"kind":"uncaught","name":"TypeError","message":"..."}
//! ```
//!
//! The prelude is ES5 only so that it loads on older shells.

use super::HarnessApi;

/// Prefix of every stdout line that belongs to the harness protocol
pub const RECORD_PREFIX: &str = "##harness ";

const PRELUDE: &str = r#"var __harness = (function (global) {
  var RECORD = %RECORD%;
  var stringify = JSON.stringify;
  var write = typeof print === 'function' ? print : console.log.bind(console);
  var indirectEval = eval;
  var failure = null;
  var skipped = null;

  function Abort() {}

  // Records are assembled from string primitives so that fixture changes to
  // toJSON or JSON.stringify cannot alter them.
  function quote(value) {
    return value === null ? 'null' : stringify(text(value));
  }

  function emit(kind, fields) {
    var line = '{"kind":' + quote(kind);
    for (var i = 0; i < fields.length; i += 2) {
      line += ',' + quote(fields[i]) + ':' + quote(fields[i + 1]);
    }
    write(RECORD + line + '}');
  }

  function text(value) {
    try { return String(value); } catch (e) { return '<unprintable value>'; }
  }

  function raise(source, message) {
    if (failure === null) {
      failure = ['source', source, 'message', text(message)];
    }
    throw new Abort();
  }

  function skip(precondition) {
    skipped = text(precondition);
    throw new Abort();
  }

  function describe(e) {
    var name = null;
    var message;
    try {
      if (e !== null && (typeof e === 'object' || typeof e === 'function')) {
        if (typeof e.name === 'string') { name = e.name; }
        message = e.message !== undefined ? text(e.message) : text(e);
      } else {
        message = text(e);
      }
    } catch (inner) {
      message = '<exception while describing thrown value>';
    }
    return ['name', name, 'message', message];
  }

  function install(path, value) {
    var parts = path.split('.');
    var target = global;
    for (var i = 0; i < parts.length - 1; i++) {
      if (target[parts[i]] === null || typeof target[parts[i]] !== 'object') {
        target[parts[i]] = {};
      }
      target = target[parts[i]];
    }
    target[parts[parts.length - 1]] = value;
  }

  install(%ERROR%, function (message) { raise('error', message); });
  install(%FAIL%, function (message) { raise('fail', message); });
  install(%ASSERT_TRUE%, function (condition) {
    if (!condition) { raise('assert_true', 'assertTrue: expected a truthy value, got ' + text(condition)); }
  });
  install(%REGISTER%, function (test) {
    var id = test && test.id !== undefined ? text(test.id) : '<anonymous>';
    if (typeof test.precondition === 'function' && !test.precondition()) {
      skip("precondition of '" + id + "'");
    }
    var result = test.test.call(global);
    if (result !== undefined && !result) {
      raise('registration', "test '" + id + "' returned " + text(result));
    }
  });
%HELPERS%
  return {
    run: function (precondition, body, strict) {
      try {
        if (precondition !== null && !indirectEval(precondition)) {
          skip(precondition);
        }
        indirectEval(strict ? '"use strict";\n' + body : body);
      } catch (e) {
        if (!(e instanceof Abort) && failure === null && skipped === null) {
          emit('uncaught', describe(e));
          return;
        }
      }
      if (failure !== null) {
        emit('assertion', failure);
      } else if (skipped !== null) {
        emit('skip', ['precondition', skipped]);
      } else {
        emit('done', []);
      }
    }
  };
})((0, eval)('this'));
"#;

const HELPERS: &str = r#"
  install('fnExists', function () {
    for (var i = 0; i < arguments.length; i++) {
      if (typeof arguments[i] !== 'function') { return false; }
    }
    return true;
  });
  install('fnGlobalObject', function () { return global; });
  install('fnSupportsStrict', function () {
    'use strict';
    try { eval('with ({}) {}'); return false; } catch (e) { return true; }
  });
  install('compareArray', function (a, b) {
    if (b.length !== a.length) { return false; }
    for (var i = 0; i < a.length; i++) {
      if (b[i] !== a[i]) { return false; }
    }
    return true;
  });
  install('arrayContains', function (arr, expected) {
    for (var i = 0; i < expected.length; i++) {
      var found = false;
      for (var j = 0; j < arr.length; j++) {
        if (expected[i] === arr[j]) { found = true; break; }
      }
      if (!found) { return false; }
    }
    return true;
  });
"#;

/// Quote `value` as a script string literal.
///
/// U+2028 and U+2029 are line terminators inside ES5 string literals, so they
/// are escaped on top of what JSON requires.
pub fn js_string(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// Render the prelude for a capability set
pub fn render(api: &HarnessApi) -> String {
    let names = api.names();
    PRELUDE
        .replace("%RECORD%", &js_string(RECORD_PREFIX))
        .replace("%ERROR%", &js_string(&names.error))
        .replace("%FAIL%", &js_string(&names.fail))
        .replace("%ASSERT_TRUE%", &js_string(&names.assert_true))
        .replace("%REGISTER%", &js_string(&names.register))
        .replace("%HELPERS%", if api.helpers() { HELPERS } else { "" })
}

/// Render the call that runs one fixture against an installed prelude
pub fn driver(precondition: Option<&str>, body: &str, strict: bool) -> String {
    let precondition = precondition.map(js_string).unwrap_or_else(|| "null".to_string());
    format!("__harness.run({}, {}, {});\n", precondition, js_string(body), strict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HarnessNames;

    #[test]
    fn test_render_installs_names() {
        let prelude = render(&HarnessApi::new());
        assert!(prelude.contains(r#"install("$ERROR", function"#));
        assert!(prelude.contains(r#"install("$FAIL", function"#));
        assert!(prelude.contains(r#"install("assertTrue", function"#));
        assert!(prelude.contains(r#"install("ES5Harness.registerTest", function"#));
        assert!(prelude.contains(r###"var RECORD = "##harness ";"###));
        assert!(!prelude.contains('%'));
    }

    #[test]
    fn test_records_do_not_stringify_objects() {
        let prelude = render(&HarnessApi::new());
        assert!(prelude.contains("stringify(text(value))"));
        assert!(!prelude.contains("emit({"));
        assert!(prelude.contains("console.log.bind(console)"));
    }

    #[test]
    fn test_helpers_are_optional() {
        assert!(render(&HarnessApi::new()).contains("install('fnExists'"));
        assert!(!render(&HarnessApi::new().with_helpers(false)).contains("fnExists"));
    }

    #[test]
    fn test_custom_names() {
        let api = HarnessApi::new().with_names(HarnessNames {
            error: "fail$".into(),
            fail: "$FAIL".into(),
            assert_true: "check".into(),
            register: "suite.add".into(),
        });
        let prelude = render(&api);
        assert!(prelude.contains(r#"install("fail$", function"#));
        assert!(prelude.contains(r#"install("suite.add", function"#));
    }

    #[test]
    fn test_js_string_escapes_line_separators() {
        assert_eq!(js_string("a\"b\n"), r#""a\"b\n""#);
        assert_eq!(js_string("x\u{2028}y"), "\"x\\u2028y\"");
    }

    #[test]
    fn test_driver_call() {
        assert_eq!(
            driver(None, "$ERROR('x');", false),
            "__harness.run(null, \"$ERROR('x');\", false);\n"
        );
        assert_eq!(
            driver(Some("fnExists(f)"), "", true),
            "__harness.run(\"fnExists(f)\", \"\", true);\n"
        );
    }
}
