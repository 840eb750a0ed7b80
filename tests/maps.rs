use test_utils::{check_error_contains, check_output, Expected};

#[test]
fn prototype_method_dispatch() {
    let source = "c = {}; c.__isa = {greet: function(); print \"hi \" + self.name; end function}; c.name = \"x\"; c.greet";
    check_output(
        source,
        Expected {
            stdout: "hi x\n",
            stderr: "",
        },
    );
}

#[test]
fn map_literals_and_dot_access() {
    check_output(
        "m = {\"a\": 1, \"b\": 2}\nprint m.a + m.b\nprint m",
        Expected {
            stdout: "3\n{\"a\": 1, \"b\": 2}\n",
            stderr: "",
        },
    );
}

#[test]
fn bare_identifier_keys_are_strings() {
    check_output(
        "m = {legs: 4}\nprint m.legs\nprint m[\"legs\"]",
        Expected {
            stdout: "4\n4\n",
            stderr: "",
        },
    );
}

#[test]
fn new_creates_instances_with_prototype() {
    let source = "\
Animal = {\"legs\": 4}
d = new Animal
print d isa Animal
print d.legs
d.legs = 2
print d.legs
print Animal.legs";
    check_output(
        source,
        Expected {
            stdout: "1\n4\n2\n4\n",
            stderr: "",
        },
    );
}

#[test]
fn isa_against_builtin_types() {
    let source = "\
print {} isa map
print [] isa list
print \"x\" isa string
print 3 isa number
print null isa null
print 3 isa string";
    check_output(
        source,
        Expected {
            stdout: "1\n1\n1\n1\n1\n0\n",
            stderr: "",
        },
    );
}

#[test]
fn super_dispatches_one_level_up() {
    let source = "\
Base = {}
Base.describe = function()
	return \"base\"
end function
Child = new Base
Child.describe = function()
	return \"child+\" + super.describe
end function
obj = new Child
print obj.describe";
    check_output(
        source,
        Expected {
            stdout: "child+base\n",
            stderr: "",
        },
    );
}

#[test]
fn pop_and_pull_follow_insertion_order() {
    let source = "\
m = {}
m.a = 1
m.b = 2
m.c = 3
print m.pop
print m.pull
print m";
    check_output(
        source,
        Expected {
            stdout: "c\na\n{\"b\": 2}\n",
            stderr: "",
        },
    );
}

#[test]
fn indexes_preserve_insertion_order() {
    check_output(
        "m = {\"z\": 1, \"a\": 2}\nprint m.indexes",
        Expected {
            stdout: "[\"z\", \"a\"]\n",
            stderr: "",
        },
    );
}

#[test]
fn iterating_a_map_yields_key_value_pairs() {
    let source = "\
m = {\"a\": 1, \"b\": 2}
for kv in m
	print kv.key + \"=\" + kv.value
end for";
    check_output(
        source,
        Expected {
            stdout: "a=1\nb=2\n",
            stderr: "",
        },
    );
}

#[test]
fn number_keys_match_by_value() {
    check_output(
        "m = {}\nm[1] = \"one\"\nprint m[1]\nprint m.hasIndex(2)",
        Expected {
            stdout: "one\n0\n",
            stderr: "",
        },
    );
}

#[test]
fn missing_key_fails() {
    check_error_contains("m = {}\nprint m.missing", "Key Not Found: 'missing' not found in map");
}

#[test]
fn overlong_isa_chain_raises_key_failure() {
    let source = "\
m = {}
node = m
for i in range(1, 1001)
	parent = {}
	node.__isa = parent
	node = parent
end for
print m.foo";
    check_error_contains(source, "Key Not Found");
}

#[test]
fn maps_alias_by_reference() {
    check_output(
        "a = {}\nb = a\nb.x = 1\nprint a.x",
        Expected {
            stdout: "1\n",
            stderr: "",
        },
    );
}
