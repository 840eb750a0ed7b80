use test_utils::{check_error_contains, check_output, Expected};

#[test]
fn sort_in_place() {
    check_output(
        "a = [5,3,4,1,2]; a.sort; print a",
        Expected {
            stdout: "[1, 2, 3, 4, 5]\n",
            stderr: "",
        },
    );
}

#[test]
fn sort_descending() {
    check_output(
        "a = [1,3,2]\na.sort(null, 0)\nprint a",
        Expected {
            stdout: "[3, 2, 1]\n",
            stderr: "",
        },
    );
}

#[test]
fn sort_by_key() {
    let source = "\
a = [{\"n\": 3}, {\"n\": 1}, {\"n\": 2}]
a.sort \"n\"
print a";
    check_output(
        source,
        Expected {
            stdout: "[{\"n\": 1}, {\"n\": 2}, {\"n\": 3}]\n",
            stderr: "",
        },
    );
}

#[test]
fn sort_puts_nulls_last() {
    check_output(
        "a = [2, null, 1]\na.sort\nprint a",
        Expected {
            stdout: "[1, 2, null]\n",
            stderr: "",
        },
    );
}

#[test]
fn push_pop_pull() {
    let source = "\
a = [1, 2]
a.push 3
print a
print a.pop
print a.pull
print a";
    check_output(
        source,
        Expected {
            stdout: "[1, 2, 3]\n3\n1\n[2]\n",
            stderr: "",
        },
    );
}

#[test]
fn negative_indices() {
    check_output(
        "a = [\"x\", \"y\", \"z\"]\nprint a[-1]\nprint a[-3]",
        Expected {
            stdout: "z\nx\n",
            stderr: "",
        },
    );
}

#[test]
fn slicing() {
    let source = "\
a = [1, 2, 3, 4, 5]
print a[1:3]
print a[:2]
print a[3:]
print a[-2:]";
    check_output(
        source,
        Expected {
            stdout: "[2, 3]\n[1, 2]\n[4, 5]\n[4, 5]\n",
            stderr: "",
        },
    );
}

#[test]
fn range_intrinsic() {
    check_output(
        "print range(1, 5)\nprint range(3, 1)\nprint range(1, 10, 3)",
        Expected {
            stdout: "[1, 2, 3, 4, 5]\n[3, 2, 1]\n[1, 4, 7, 10]\n",
            stderr: "",
        },
    );
}

#[test]
fn range_with_zero_step_fails() {
    check_error_contains("print range(1, 10, 0)", "range() error (step==0)");
}

#[test]
fn indexes_and_has_index() {
    let source = "\
a = [1, 2, 3]
print a.indexes
print a.hasIndex(2)
print a.hasIndex(3)
print a.hasIndex(-3)";
    check_output(
        source,
        Expected {
            stdout: "[0, 1, 2]\n1\n0\n1\n",
            stderr: "",
        },
    );
}

#[test]
fn index_of_and_sum() {
    check_output(
        "print [10, 20, 30].indexOf(20)\nprint [10, 20, 30].indexOf(99)\nprint [1, 2, 3].sum",
        Expected {
            stdout: "1\nnull\n6\n",
            stderr: "",
        },
    );
}

#[test]
fn lists_alias_by_reference() {
    check_output(
        "a = [1]\nb = a\nb.push 2\nprint a",
        Expected {
            stdout: "[1, 2]\n",
            stderr: "",
        },
    );
}

#[test]
fn list_literals_are_fresh_per_execution() {
    let source = "\
rows = []
for i in range(1, 3)
	row = [0]
	row.push i
	rows.push row
end for
print rows";
    check_output(
        source,
        Expected {
            stdout: "[[0, 1], [0, 2], [0, 3]]\n",
            stderr: "",
        },
    );
}

#[test]
fn insert_and_remove() {
    let source = "\
a = [1, 3]
a.insert 1, 2
print a
a.remove 0
print a";
    check_output(
        source,
        Expected {
            stdout: "[1, 2, 3]\n[2, 3]\n",
            stderr: "",
        },
    );
}

#[test]
fn out_of_range_index_fails() {
    check_error_contains("a = [1]\nprint a[3]", "Index Error (list index 3 out of range)");
}
