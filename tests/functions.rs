use test_utils::{check_error_contains, check_output, Expected};

#[test]
fn calls_a_simple_function() {
    check_output(
        "f = function(x); return x*3; end function; print f(14)",
        Expected {
            stdout: "42\n",
            stderr: "",
        },
    );
}

#[test]
fn default_parameter_values() {
    check_output(
        "f = function(a, b=10)\nreturn a + b\nend function\nprint f(1)\nprint f(1, 2)",
        Expected {
            stdout: "11\n3\n",
            stderr: "",
        },
    );
}

#[test]
fn zero_arg_functions_invoke_by_name() {
    check_output(
        "f = function()\nreturn 5\nend function\nx = f\nprint x",
        Expected {
            stdout: "5\n",
            stderr: "",
        },
    );
}

#[test]
fn address_of_defers_invocation() {
    check_output(
        "f = function()\nreturn 5\nend function\ng = @f\nprint g",
        Expected {
            stdout: "5\n",
            stderr: "",
        },
    );
}

#[test]
fn interpret_fib() {
    let source = "\
fib = function(n)
	if n < 2 then return n
	return fib(n-1) + fib(n-2)
end function
print fib(20)";
    check_output(
        source,
        Expected {
            stdout: "6765\n",
            stderr: "",
        },
    );
}

#[test]
fn too_many_arguments_fails() {
    check_error_contains(
        "f = function(x); return x; end function; f 1, 2",
        "Too Many Arguments",
    );
}

#[test]
fn calling_a_non_function_with_args_fails() {
    check_error_contains("x = 5; x 1", "Too Many Arguments");
}

#[test]
fn return_without_value_yields_null() {
    check_output(
        "f = function()\nreturn\nend function\nprint f == null",
        Expected {
            stdout: "1\n",
            stderr: "",
        },
    );
}

#[test]
fn function_as_argument_is_called_first() {
    check_output(
        "g = function()\nreturn 3\nend function\nf = function(x)\nreturn x + 1\nend function\nprint f(g)",
        Expected {
            stdout: "4\n",
            stderr: "",
        },
    );
}

#[test]
fn version_map_has_expected_keys() {
    check_output(
        "v = version\nprint v.hasIndex(\"miniscript\") + v.hasIndex(\"buildDate\") + v.hasIndex(\"host\") + v.hasIndex(\"hostName\") + v.hasIndex(\"hostInfo\")",
        Expected {
            stdout: "5\n",
            stderr: "",
        },
    );
}
