use test_utils::{check_output, Expected};

#[test]
fn short_circuit_and_skips_rhs() {
    let source = "\
n = 0
f = function()
	globals.n = globals.n + 1
	return 1
end function
print false and f()
print n";
    check_output(
        source,
        Expected {
            stdout: "0\n0\n",
            stderr: "",
        },
    );
}

#[test]
fn short_circuit_or_skips_rhs() {
    let source = "\
n = 0
f = function()
	globals.n = globals.n + 1
	return 1
end function
print true or f()
print n";
    check_output(
        source,
        Expected {
            stdout: "1\n0\n",
            stderr: "",
        },
    );
}

#[test]
fn fuzzy_and_or_not() {
    let source = "\
print 0.5 and 0.5
print 0.25 or 0.25
print not 0.25
print not 0";
    check_output(
        source,
        Expected {
            stdout: "0.25\n0.4375\n0.75\n1\n",
            stderr: "",
        },
    );
}

#[test]
fn fuzzy_intermediates_survive_or_chains() {
    // a partially-true value must not short-circuit the chain
    check_output(
        "print 0.5 or 1",
        Expected {
            stdout: "1\n",
            stderr: "",
        },
    );
}

#[test]
fn boolean_coercion_of_strings_and_lists() {
    let source = "\
print \"\" or \"x\"
print [] and [1]
print not \"\"
print not \"x\"";
    check_output(
        source,
        Expected {
            stdout: "1\n0\n1\n0\n",
            stderr: "",
        },
    );
}

#[test]
fn equality_and_inequality() {
    let source = "\
print [1, [2, 3]] == [1, [2, 3]]
print {\"a\": 1} == {\"a\": 1}
print {\"a\": 1} == {\"a\": 2}
print 1 == \"1\"
print null == null
print 3 != 4";
    check_output(
        source,
        Expected {
            stdout: "1\n1\n0\n0\n1\n1\n",
            stderr: "",
        },
    );
}

#[test]
fn fuzzy_truth_drives_if() {
    check_output(
        "if 0.2 then print \"taken\"\nif 0 then print \"not taken\"",
        Expected {
            stdout: "taken\n",
            stderr: "",
        },
    );
}

#[test]
fn function_equality_is_identity() {
    let source = "\
f = function()
	return 1
end function
g = @f
print @f == @g
h = function()
	return 1
end function
print @f == @h";
    check_output(
        source,
        Expected {
            stdout: "1\n0\n",
            stderr: "",
        },
    );
}
