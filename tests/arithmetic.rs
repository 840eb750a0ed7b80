use test_utils::{check_output, Expected};

#[test]
fn prints_basic_arithmetic() {
    check_output(
        "print 6*7",
        Expected {
            stdout: "42\n",
            stderr: "",
        },
    );
}

#[test]
fn operator_precedence() {
    check_output(
        "print 3 + 4 * 2\nprint (3 + 4) * 2\nprint 2 + 3 ^ 2",
        Expected {
            stdout: "11\n14\n11\n",
            stderr: "",
        },
    );
}

#[test]
fn division_mod_power() {
    check_output(
        "print 1/4\nprint 7 % 3\nprint 2^10",
        Expected {
            stdout: "0.25\n1\n1024\n",
            stderr: "",
        },
    );
}

#[test]
fn unary_minus() {
    check_output(
        "print -5 + 3\nx = 4\nprint -x",
        Expected {
            stdout: "-2\n-4\n",
            stderr: "",
        },
    );
}

#[test]
fn scientific_notation_formatting() {
    check_output(
        "print 1e12\nprint 0.0000001",
        Expected {
            stdout: "1E+12\n1E-7\n",
            stderr: "",
        },
    );
}

#[test]
fn string_concatenation() {
    check_output(
        "print \"foo\" + \"bar\"\nprint \"n = \" + 42\nprint \"x\" + null",
        Expected {
            stdout: "foobar\nn = 42\nx\n",
            stderr: "",
        },
    );
}

#[test]
fn string_replication_and_division() {
    check_output(
        "print \"ab\" * 3\nprint \"abc\" * 2.5\nprint \"miniscript\" / 2",
        Expected {
            stdout: "ababab\nabcabca\nminis\n",
            stderr: "",
        },
    );
}

#[test]
fn list_arithmetic() {
    check_output(
        "print [1,2] + [3]\nprint [1,2] * 2",
        Expected {
            stdout: "[1, 2, 3]\n[1, 2, 1, 2]\n",
            stderr: "",
        },
    );
}

#[test]
fn map_merge() {
    check_output(
        "print {\"a\": 1} + {\"b\": 2, \"a\": 9}",
        Expected {
            stdout: "{\"a\": 9, \"b\": 2}\n",
            stderr: "",
        },
    );
}

#[test]
fn chained_comparisons() {
    check_output(
        "x = 5\nprint 1 < x < 10\nprint 1 < x < 3",
        Expected {
            stdout: "1\n0\n",
            stderr: "",
        },
    );
}

#[test]
fn adding_list_to_number_is_a_type_error() {
    test_utils::check_error_contains("print [1] + 1", "Type Error");
}
