use test_utils::{check_error_contains, check_output, Expected};

#[test]
fn index_of_with_after_argument() {
    let source = "\
s = \"Hello World\"
print s.indexOf(\"o\")
print s.indexOf(\"o\", 4)
print s.indexOf(\"o\", 7)";
    check_output(
        source,
        Expected {
            stdout: "4\n7\nnull\n",
            stderr: "",
        },
    );
}

#[test]
fn upper_and_lower_are_idempotent() {
    check_output(
        "print \"MiniScript\".upper\nprint \"MiniScript\".upper.upper\nprint \"MiniScript\".lower",
        Expected {
            stdout: "MINISCRIPT\nMINISCRIPT\nminiscript\n",
            stderr: "",
        },
    );
}

#[test]
fn split_and_join() {
    check_output(
        "print \"a,b,c\".split(\",\")\nprint \"a b c\".split\nprint [1, 2, 3].join(\"-\")",
        Expected {
            stdout: "[\"a\", \"b\", \"c\"]\n[\"a\", \"b\", \"c\"]\n1-2-3\n",
            stderr: "",
        },
    );
}

#[test]
fn split_with_max_count() {
    check_output(
        "print \"a,b,c,d\".split(\",\", 2)",
        Expected {
            stdout: "[\"a\", \"b,c,d\"]\n",
            stderr: "",
        },
    );
}

#[test]
fn replace_with_max_count() {
    check_output(
        "print \"aaa\".replace(\"a\", \"b\", 2)\nprint \"aaa\".replace(\"a\", \"b\")",
        Expected {
            stdout: "bba\nbbb\n",
            stderr: "",
        },
    );
}

#[test]
fn val_and_str_round_trip() {
    check_output(
        "print val(\"3.5\") + 1\nprint str(42) + \"!\"\nprint val(str(12.25))",
        Expected {
            stdout: "4.5\n42!\n12.25\n",
            stderr: "",
        },
    );
}

#[test]
fn char_and_code() {
    check_output(
        "print char(65)\nprint \"A\".code\nprint char(960)",
        Expected {
            stdout: "A\n65\n\u{3c0}\n",
            stderr: "",
        },
    );
}

#[test]
fn string_indexing() {
    check_output(
        "print \"hello\"[1]\nprint \"hello\"[-1]\nprint \"hello\".len",
        Expected {
            stdout: "e\no\n5\n",
            stderr: "",
        },
    );
}

#[test]
fn strings_are_immutable() {
    check_error_contains(
        "s = \"abc\"\ns[0] = \"x\"",
        "can't set an indexed element of a string",
    );
}

#[test]
fn insert_and_remove_return_new_strings() {
    let source = "\
s = \"hello\"
print s.insert(0, \"say \")
print s
print \"hello world\".remove(\"o\")";
    check_output(
        source,
        Expected {
            stdout: "say hello\nhello\nhell world\n",
            stderr: "",
        },
    );
}

#[test]
fn lexicographic_comparison() {
    check_output(
        "print \"apple\" < \"banana\"\nprint \"b\" >= \"a\"",
        Expected {
            stdout: "1\n1\n",
            stderr: "",
        },
    );
}

#[test]
fn string_slicing() {
    check_output(
        "s = \"miniscript\"\nprint s[0:4]\nprint s[4:]\nprint s[-3:]",
        Expected {
            stdout: "mini\nscript\nipt\n",
            stderr: "",
        },
    );
}
