use test_utils::{check_output, Expected};

#[test]
fn closure_sees_later_mutation_of_captured_frame() {
    let source = "\
f = function()
	x = 10
	g = function()
		return x
	end function
	x = 12
	return @g
end function
h = f()
print h()";
    check_output(
        source,
        Expected {
            stdout: "12\n",
            stderr: "",
        },
    );
}

#[test]
fn counter_mutates_captured_environment() {
    let source = "\
makeCounter = function()
	count = 0
	return function()
		outer.count = outer.count + 1
		return outer.count
	end function
end function
c = makeCounter()
print c()
print c()
print c()";
    check_output(
        source,
        Expected {
            stdout: "1\n2\n3\n",
            stderr: "",
        },
    );
}

#[test]
fn two_closures_share_one_environment() {
    let source = "\
makePair = function()
	n = 0
	inc = function()
		outer.n = outer.n + 1
		return outer.n
	end function
	get = function()
		return outer.n
	end function
	return [@inc, @get]
end function
p = makePair()
print p[0]
print p[1]
print p[0]";
    check_output(
        source,
        Expected {
            stdout: "1\n1\n2\n",
            stderr: "",
        },
    );
}

#[test]
fn independent_instances_do_not_share_state() {
    let source = "\
makeCounter = function()
	count = 0
	return function()
		outer.count = outer.count + 1
		return outer.count
	end function
end function
a = makeCounter()
b = makeCounter()
print a()
print a()
print b()";
    check_output(
        source,
        Expected {
            stdout: "1\n2\n1\n",
            stderr: "",
        },
    );
}
