use test_utils::{check_output, Expected};

#[test]
fn while_loop_counts() {
    check_output(
        "i = 0\nwhile i < 5\ni = i + 1\nend while\nprint i",
        Expected {
            stdout: "5\n",
            stderr: "",
        },
    );
}

#[test]
fn for_over_list_and_string() {
    let source = "\
for x in [10, 20]
	print x
end for
for c in \"ab\"
	print c
end for";
    check_output(
        source,
        Expected {
            stdout: "10\n20\na\nb\n",
            stderr: "",
        },
    );
}

#[test]
fn continue_and_break() {
    let source = "\
total = 0
for i in range(1, 10)
	if i % 2 == 0 then continue
	if i > 7 then break
	total = total + i
end for
print total";
    check_output(
        source,
        Expected {
            stdout: "16\n",
            stderr: "",
        },
    );
}

#[test]
fn break_only_exits_innermost_loop() {
    let source = "\
count = 0
for i in range(1, 3)
	for j in range(1, 3)
		if j == 2 then break
		count = count + 1
	end for
end for
print count";
    check_output(
        source,
        Expected {
            stdout: "3\n",
            stderr: "",
        },
    );
}

#[test]
fn while_with_break_and_continue() {
    let source = "\
i = 0
found = 0
while true
	i = i + 1
	if i % 3 != 0 then continue
	found = i
	break
end while
print found";
    check_output(
        source,
        Expected {
            stdout: "3\n",
            stderr: "",
        },
    );
}

#[test]
fn loop_over_empty_list_never_runs() {
    check_output(
        "for x in []\nprint x\nend for\nprint \"done\"",
        Expected {
            stdout: "done\n",
            stderr: "",
        },
    );
}

#[test]
fn single_line_if_with_else() {
    check_output(
        "x = 3\nif x > 2 then print \"big\" else print \"small\"\nif x > 5 then print \"big\" else print \"small\"",
        Expected {
            stdout: "big\nsmall\n",
            stderr: "",
        },
    );
}

#[test]
fn else_if_chain() {
    let source = "\
classify = function(n)
	if n < 0 then
		return \"negative\"
	else if n == 0 then
		return \"zero\"
	else
		return \"positive\"
	end if
end function
print classify(-5)
print classify(0)
print classify(9)";
    check_output(
        source,
        Expected {
            stdout: "negative\nzero\npositive\n",
            stderr: "",
        },
    );
}

#[test]
fn loop_variable_index_is_visible() {
    // the hidden index variable the for lowering maintains
    check_output(
        "for x in [9, 9]\nend for\nprint __x_idx",
        Expected {
            stdout: "2\n",
            stderr: "",
        },
    );
}
