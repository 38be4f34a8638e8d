//! Tests for the dispatch core.

#[cfg(test)]
mod dispatch_tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::dispatch::{
        Api, ApiError, Arg, Context, ContextKey, DynamicHandler, Error, ErrorKind, InputShape, Json,
        OutputShape, Param, PathVars, PatternError, Returned, RoutePattern, Segment,
    };

    #[derive(Debug, Deserialize)]
    struct TestInput {
        #[serde(rename = "foo", default)]
        var1: String,
        #[serde(rename = "Var2", default)]
        var2: i64,
    }

    #[derive(Debug, Serialize)]
    struct Summary {
        name: String,
        count: i64,
    }

    fn endpoint_handler(Json(input): Json<TestInput>) -> Option<Error> {
        if input.var1 == "PANIC" {
            return Some(Error::msg("PANICKING"));
        }
        None
    }

    fn path_var_handler(ctx: Context, _input: Json<TestInput>) -> Result<Option<String>, Error> {
        Ok(ctx.path_var("foo").map(String::from))
    }

    fn api_error_handler() -> ApiError {
        ApiError::new(418, "I'm a teapot")
    }

    fn test_api() -> Api {
        let mut api = Api::new();
        api.add_endpoint("GET/test", endpoint_handler).unwrap();
        api.add_endpoint("PUT/test", endpoint_handler).unwrap();
        api.add_endpoint("DELETE/tests", endpoint_handler).unwrap();
        api.add_endpoint("DELETE/test/{id}", endpoint_handler).unwrap();
        api.add_endpoint("GET/apiErrorTest", api_error_handler).unwrap();
        api
    }

    struct Claims;

    impl ContextKey for Claims {
        type Value = String;
    }

    struct RequestId;

    impl ContextKey for RequestId {
        type Value = u64;
    }

    #[test]
    fn test_parse_pattern() {
        let pattern: RoutePattern = "DELETE/test/{id}".parse().unwrap();
        assert_eq!(pattern.method(), "DELETE");
        assert_eq!(
            pattern.segments(),
            &[Segment::Literal("test".to_string()), Segment::Variable("id".to_string())]
        );
        assert_eq!(pattern.to_string(), "DELETE/test/{id}");
    }

    #[test]
    fn test_parse_pattern_errors() {
        assert!(matches!("/test".parse::<RoutePattern>(), Err(PatternError::MissingMethod(_))));
        assert!(matches!("GET".parse::<RoutePattern>(), Err(PatternError::MissingPath(_))));
        assert!(matches!("GET/user/{}".parse::<RoutePattern>(), Err(PatternError::EmptyVariable(_))));
        assert!(matches!(
            "GET/{id}/x/{id}".parse::<RoutePattern>(),
            Err(PatternError::DuplicateVariable { ref name, .. }) if name == "id"
        ));
    }

    #[test]
    fn test_literal_match() {
        let pattern: RoutePattern = "GET/api/users".parse().unwrap();

        let vars = pattern.match_route("GET", "/api/users").unwrap();
        assert!(vars.is_empty());

        assert!(pattern.match_route("POST", "/api/users").is_none());
        assert!(pattern.match_route("get", "/api/users").is_none());
        assert!(pattern.match_route("GET", "/api/user").is_none());
        assert!(pattern.match_route("GET", "/api").is_none());
        assert!(pattern.match_route("GET", "/api/users/1").is_none());
        assert!(pattern.match_route("GET", "/api/users/").is_none());
    }

    #[test]
    fn test_variable_match() {
        let pattern: RoutePattern = "GET/user/{foo}".parse().unwrap();

        let vars = pattern.match_route("GET", "/user/abcde").unwrap();
        assert_eq!(vars, PathVars::from_iter([("foo", "abcde")]));
        assert_eq!(vars.get("foo"), Some("abcde"));
        assert_eq!(vars.get("bar"), None);

        // A variable never binds an empty segment
        assert!(pattern.match_route("GET", "/user/").is_none());
        assert!(pattern.match_route("GET", "/user").is_none());
    }

    #[test]
    fn test_failed_match_returns_no_bindings() {
        let pattern: RoutePattern = "GET/{org}/repos/{repo}".parse().unwrap();
        assert!(pattern.match_route("GET", "/acme/issues/widgets").is_none());

        let vars = pattern.match_route("GET", "/acme/repos/widgets").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("org"), Some("acme"));
        assert_eq!(vars.get("repo"), Some("widgets"));
    }

    #[test]
    fn test_match_is_idempotent() {
        let pattern: RoutePattern = "GET/user/{foo}".parse().unwrap();
        let first = pattern.match_route("GET", "/user/abcde");
        let second = pattern.match_route("GET", "/user/abcde");
        assert_eq!(first, second);
    }

    #[test]
    fn test_match_path_ignores_method() {
        let pattern: RoutePattern = "DELETE/test/{id}".parse().unwrap();
        assert!(pattern.match_path("/test/42"));
        assert!(!pattern.match_path("/test"));
    }

    #[test]
    fn test_methods_for_path() {
        let api = test_api();

        let methods = api.methods_for_path("/test");
        assert_eq!(methods, vec!["GET", "PUT"]);

        // Repeated lookups are deterministic
        assert_eq!(api.methods_for_path("/test"), methods);

        assert_eq!(api.methods_for_path("/test/7"), vec!["DELETE"]);
        assert!(api.methods_for_path("/nothing/here").is_empty());
    }

    #[test]
    fn test_methods_for_path_keeps_duplicates() {
        let mut api = Api::new();
        api.add_endpoint("GET/test", || ()).unwrap();
        api.add_endpoint("GET/test", || ()).unwrap();
        assert_eq!(api.methods_for_path("/test"), vec!["GET", "GET"]);
    }

    #[test]
    fn test_first_match_wins() {
        let mut api = Api::new();
        api.add_endpoint("GET/user/me", || "literal").unwrap();
        api.add_endpoint("GET/user/{id}", |ctx: Context| ctx.path_vars().get("id").map(String::from))
            .unwrap();

        let result = api.call(Context::new(), "GET", "/user/me", b"").unwrap();
        assert_eq!(result, Some(json!("literal")));

        let result = api.call(Context::new(), "GET", "/user/42", b"").unwrap();
        assert_eq!(result, Some(json!("42")));

        // Registered the other way round, the variable pattern shadows the literal
        let mut api = Api::new();
        api.add_endpoint("GET/user/{id}", || "variable").unwrap();
        api.add_endpoint("GET/user/me", || "literal").unwrap();
        let result = api.call(Context::new(), "GET", "/user/me", b"").unwrap();
        assert_eq!(result, Some(json!("variable")));
    }

    #[test]
    fn test_endpoints() {
        let api = test_api();
        let ctx = Context::new();

        let result = api.call(ctx.clone(), "GET", "/test", br#"{"foo": "hello", "Var2": 42}"#);
        assert!(matches!(result, Ok(None)));

        let err = api.call(ctx.clone(), "GET", "/test", br#"{"Var1":"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.to_string().contains("malformed"));

        let err = api.call(ctx.clone(), "POST", "/none", b"").unwrap_err();
        assert!(matches!(err, Error::NotFound));
        assert!(err.to_string().contains("not found"));

        let result = api.call(ctx.clone(), "GET", "/test", br#"{"foo": "PANIC", "Var2": 42}"#);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "PANICKING");
        assert_eq!(err.kind(), ErrorKind::Application);

        let err = api.call(ctx, "GET", "/apiErrorTest", b"").unwrap_err();
        assert_eq!(err.to_string(), "I'm a teapot");
        assert_eq!(err.kind(), ErrorKind::Coded(418));
    }

    #[test]
    fn test_unmatched_path_is_not_found() {
        let mut api = Api::new();
        api.add_endpoint("GET/test", || ()).unwrap();
        api.add_endpoint("GET/apiErrorTest", api_error_handler).unwrap();

        let err = api.call(Context::new(), "GET", "/none", b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_endpoint_with_context() {
        let mut api = Api::new();
        api.add_endpoint("GET/user/{foo}", path_var_handler).unwrap();

        let result = api.call(Context::new(), "GET", "/user/abcde", b"{}").unwrap();
        assert_eq!(result, Some(json!("abcde")));
    }

    #[test]
    fn test_data_then_context_order() {
        let mut api = Api::new();
        api.add_endpoint("POST/count/{name}", |Json(input): Json<TestInput>, ctx: Context| {
            Json(Summary {
                name: ctx.path_var("name").unwrap_or_default().to_string(),
                count: input.var2,
            })
        })
        .unwrap();

        let result = api.call(Context::new(), "POST", "/count/widgets", br#"{"Var2": 3}"#).unwrap();
        assert_eq!(result, Some(json!({"name": "widgets", "count": 3})));
    }

    #[test]
    fn test_handler_shapes() {
        let mut api = Api::new();
        api.add_endpoint("GET/a", || ()).unwrap();
        api.add_endpoint("GET/b", |_ctx: Context| "ok").unwrap();
        api.add_endpoint("GET/c", |_in: Json<TestInput>| Ok::<_, Error>("ok")).unwrap();
        api.add_endpoint("GET/d", |_ctx: Context, _in: Json<TestInput>| ()).unwrap();

        let shapes: Vec<_> = api
            .endpoints()
            .iter()
            .map(|endpoint| endpoint.handler().shape().unwrap())
            .collect();
        assert_eq!(
            shapes,
            vec![
                (InputShape::Nothing, OutputShape::Nothing),
                (InputShape::Context, OutputShape::DataOrError),
                (InputShape::Data, OutputShape::DataAndError),
                (InputShape::ContextThenData, OutputShape::Nothing),
            ]
        );
    }

    #[test]
    fn test_result_normalization() {
        let mut api = Api::new();
        api.add_endpoint("GET/none", || Ok::<Option<String>, Error>(None)).unwrap();
        api.add_endpoint("GET/null", || serde_json::Value::Null).unwrap();
        api.add_endpoint("GET/data", || Ok::<_, Error>(Json(vec![1, 2, 3]))).unwrap();
        api.add_endpoint("GET/err", || Err::<String, _>(ApiError::new(409, "conflict"))).unwrap();
        api.add_endpoint("GET/number", || 7_i64).unwrap();

        let ctx = Context::new();
        assert!(matches!(api.call(ctx.clone(), "GET", "/none", b""), Ok(None)));
        assert!(matches!(api.call(ctx.clone(), "GET", "/null", b""), Ok(None)));
        assert_eq!(api.call(ctx.clone(), "GET", "/data", b"").unwrap(), Some(json!([1, 2, 3])));
        assert_eq!(api.call(ctx.clone(), "GET", "/number", b"").unwrap(), Some(json!(7)));

        let err = api.call(ctx, "GET", "/err", b"").unwrap_err();
        assert!(matches!(err, Error::Api(ref api_err) if api_err.status_code == 409));
    }

    #[test]
    fn test_empty_body_for_data_handler() {
        let mut api = Api::new();
        api.add_endpoint("POST/items", endpoint_handler).unwrap();

        let err = api.call(Context::new(), "POST", "/items", b"").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_endpoint_bad_handler() {
        let mut api = Api::new();
        let handler = DynamicHandler::new([Param::Data, Param::Data], 2, |_args| {
            vec![Returned::Data(json!("OK")), Returned::Nil]
        });
        api.add_endpoint("GET/test", handler).unwrap();
        assert!(api.endpoints()[0].handler().fault().is_some());

        let err = api.call(Context::new(), "GET", "/test", br#"{"foo": "TestAdmin"}"#).unwrap_err();
        assert!(matches!(err, Error::Internal));
    }

    #[test]
    fn test_dynamic_handler_declarations() {
        let noop = |_args: Vec<Arg>| Vec::new();

        let cases = [
            (vec![Param::Context, Param::Context], 0, Some("takes multiple context inputs")),
            (vec![Param::Data, Param::Data], 0, Some("takes multiple inputs")),
            (vec![Param::Context, Param::Data, Param::Data], 0, Some("takes too many args")),
            (vec![Param::Context], 3, Some("returns too many values")),
            (vec![Param::Data, Param::Context], 2, None),
        ];
        for (params, results, fault) in cases {
            let handler = DynamicHandler::new(params, results, noop);
            assert_eq!(handler.classify().err().as_deref(), fault);
        }
    }

    #[test]
    fn test_dynamic_handler_call() {
        let mut api = Api::new();
        let echo = DynamicHandler::new([Param::Context, Param::Data], 2, |args| {
            let mut out = Vec::new();
            for arg in args {
                if let Arg::Data(value) = arg {
                    out.push(Returned::Data(value));
                }
            }
            out.push(Returned::Nil);
            out
        });
        api.add_endpoint("POST/echo", echo).unwrap();

        let result = api.call(Context::new(), "POST", "/echo", br#"{"a": 1}"#).unwrap();
        assert_eq!(result, Some(json!({"a": 1})));
    }

    #[test]
    fn test_dynamic_handler_broken_results() {
        let mut api = Api::new();
        api.add_endpoint(
            "GET/short",
            DynamicHandler::new([], 2, |_args| vec![Returned::Nil]),
        )
        .unwrap();
        api.add_endpoint(
            "GET/swapped",
            DynamicHandler::new([], 2, |_args| {
                vec![Returned::Error(Error::msg("oops")), Returned::Data(json!(1))]
            }),
        )
        .unwrap();
        api.add_endpoint(
            "GET/reversed",
            DynamicHandler::new([], 2, |_args| vec![Returned::Error(Error::msg("oops")), Returned::Nil]),
        )
        .unwrap();

        let ctx = Context::new();
        assert!(matches!(api.call(ctx.clone(), "GET", "/short", b""), Err(Error::Internal)));
        assert!(matches!(api.call(ctx.clone(), "GET", "/swapped", b""), Err(Error::Internal)));

        // An error in the data slot is passed through as data
        assert_eq!(api.call(ctx, "GET", "/reversed", b"").unwrap(), Some(json!("oops")));
    }

    #[test]
    fn test_middleware() {
        let mut api = Api::new();
        api.add_endpoint("GET/test/{TestVar}", endpoint_handler)
            .unwrap()
            .with_hook(|input| {
                if input.context.path_var("TestVar") != Some("TestVar") {
                    return Err(Error::from("ERROR"));
                }
                Ok(input)
            });

        let result = api.call(Context::new(), "GET", "/test/TestVar", b"{}");
        assert!(result.is_ok());

        // Since the TestVar path variable is not "TestVar", the middleware should fail
        let err = api.call(Context::new(), "GET", "/test/none", b"{}").unwrap_err();
        assert_eq!(err.to_string(), "ERROR");
    }

    #[test]
    fn test_middleware_abort_skips_handler() {
        let invoked = Arc::new(Mutex::new(false));
        let flag = invoked.clone();

        let mut api = Api::new();
        api.add_endpoint("GET/guarded", move || {
            *flag.lock().unwrap() = true;
        })
        .unwrap()
        .with_hook(|_input| Err(ApiError::new(401, "unauthorized").into()));

        let err = api.call(Context::new(), "GET", "/guarded", b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Coded(401));
        assert!(!*invoked.lock().unwrap());
    }

    #[test]
    fn test_middleware_runs_in_order_and_replaces_input() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();

        let mut api = Api::new();
        api.add_endpoint("POST/whoami", |ctx: Context, Json(input): Json<TestInput>| {
            format!("{}:{}", ctx.value::<Claims>().cloned().unwrap_or_default(), input.var1)
        })
        .unwrap()
        .with_hook(move |mut input| {
            first.lock().unwrap().push("claims");
            input.context = input.context.with_value::<Claims>("alice".to_string());
            Ok(input)
        })
        .with_hook(move |mut input| {
            second.lock().unwrap().push("body");
            input.body = br#"{"foo": "rewritten"}"#.to_vec();
            Ok(input)
        });

        let result = api.call(Context::new(), "POST", "/whoami", br#"{"foo": "original"}"#).unwrap();
        assert_eq!(result, Some(json!("alice:rewritten")));
        assert_eq!(*order.lock().unwrap(), vec!["claims", "body"]);
    }

    #[test]
    fn test_panicking_handler_is_internal_error() {
        let mut api = Api::new();
        api.add_endpoint("GET/boom", || -> Option<Error> { panic!("handler exploded") })
            .unwrap();
        api.add_endpoint("GET/hook-boom", || ())
            .unwrap()
            .with_hook(|_input| panic!("hook exploded"));

        let err = api.call(Context::new(), "GET", "/boom", b"").unwrap_err();
        assert!(matches!(err, Error::Internal));

        let err = api.call(Context::new(), "GET", "/hook-boom", b"").unwrap_err();
        assert!(matches!(err, Error::Internal));
    }

    #[test]
    fn test_context_derivation() {
        let root = Context::new().with_value::<RequestId>(1);
        let child = root.with_value::<Claims>("alice".to_string());
        let grandchild = child.with_value::<RequestId>(2);

        assert_eq!(root.value::<RequestId>(), Some(&1));
        assert_eq!(root.value::<Claims>(), None);
        assert_eq!(child.value::<RequestId>(), Some(&1));
        assert_eq!(child.value::<Claims>().map(String::as_str), Some("alice"));
        assert_eq!(grandchild.value::<RequestId>(), Some(&2));
        assert_eq!(grandchild.depth(), 3);

        assert_eq!(Context::new().value::<RequestId>(), None);
        assert!(Context::new().path_vars().is_empty());
    }

    #[test]
    fn test_context_path_vars() {
        let vars = PathVars::from_iter([("id", "7")]);
        let ctx = Context::new().with_path_vars(vars.clone());
        assert_eq!(ctx.path_vars(), vars);
        assert_eq!(ctx.path_var("id"), Some("7"));
        assert_eq!(ctx.path_var("missing"), None);
    }

    #[test]
    fn test_concurrent_calls() {
        let mut api = Api::new();
        api.add_endpoint("GET/echo/{value}", |ctx: Context| ctx.path_var("value").map(String::from))
            .unwrap();
        api.add_endpoint("GET/boom", || -> Option<Error> { panic!("boom") })
            .unwrap();
        let api = Arc::new(api);
        let root = Context::new().with_value::<RequestId>(0);

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let api = api.clone();
                let root = root.clone();
                thread::spawn(move || {
                    if i % 4 == 0 {
                        assert!(matches!(api.call(root, "GET", "/boom", b""), Err(Error::Internal)));
                        return;
                    }
                    let path = format!("/echo/{i}");
                    let result = api.call(root, "GET", &path, b"").unwrap();
                    assert_eq!(result, Some(json!(i.to_string())));
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(root.path_vars().is_empty());
    }

    #[test]
    fn test_unit_result_handler() {
        let mut api = Api::new();
        api.add_endpoint("POST/check", |Json(input): Json<TestInput>| -> Result<(), Error> {
            if input.var1 == "PANIC" {
                return Err(Error::msg("PANICKING"));
            }
            Ok(())
        })
        .unwrap();

        let ok = api.call(Context::new(), "POST", "/check", br#"{"foo": "fine"}"#);
        assert!(matches!(ok, Ok(None)));

        let err = api
            .call(Context::new(), "POST", "/check", br#"{"foo": "PANIC"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "PANICKING");
    }

    #[test]
    fn test_more_data_types() {
        let mut api = Api::new();
        api.add_endpoint("GET/byte", || 7u8).unwrap();
        api.add_endpoint("GET/short", || -3i16).unwrap();
        api.add_endpoint("GET/ratio", || 0.5f32).unwrap();
        api.add_endpoint("GET/summaries", || {
            vec![Summary {
                name: "a".to_string(),
                count: 1,
            }]
        })
        .unwrap();
        api.add_endpoint("GET/names", || Ok::<_, Error>(vec!["x", "y"])).unwrap();

        let call = |path: &str| api.call(Context::new(), "GET", path, b"").unwrap();
        assert_eq!(call("/byte"), Some(json!(7)));
        assert_eq!(call("/short"), Some(json!(-3)));
        assert_eq!(call("/ratio"), Some(json!(0.5)));
        assert_eq!(call("/summaries"), Some(json!([{ "name": "a", "count": 1 }])));
        assert_eq!(call("/names"), Some(json!(["x", "y"])));
    }

    struct CapturedErrors(Mutex<Vec<String>>);

    impl log::Log for CapturedErrors {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Error
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.0.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static CAPTURED_ERRORS: CapturedErrors = CapturedErrors(Mutex::new(Vec::new()));

    #[inline(never)]
    fn explode_in_handler() -> String {
        panic!("boom at the origin")
    }

    #[test]
    fn test_panic_log_names_pattern_and_origin() {
        let _ = log::set_logger(&CAPTURED_ERRORS);
        log::set_max_level(log::LevelFilter::Error);

        let mut api = Api::new();
        api.add_endpoint("GET/boom/{id}", |_ctx: Context| explode_in_handler())
            .unwrap();
        let result = api.call(Context::new(), "GET", "/boom/1", b"");
        assert!(matches!(result, Err(Error::Internal)));

        let records = CAPTURED_ERRORS.0.lock().unwrap();
        let record = records
            .iter()
            .find(|record| record.contains("GET/boom/{id}"))
            .expect("panic was not logged with its endpoint pattern");
        assert!(record.contains("boom at the origin"));
        assert!(record.contains("src/dispatch/tests.rs"));
        assert!(record.contains("explode_in_handler"));
    }
}
