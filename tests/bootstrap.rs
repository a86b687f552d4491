use iota::Interp;

const BOOTSTRAP: &str = include_str!("../bootstrap.l");

fn interp() -> Interp {
    let mut interp = Interp::new(50_000).unwrap();
    interp.eval_str(BOOTSTRAP).unwrap();
    interp
}

fn run(interp: &mut Interp, src: &str) -> String {
    let val = interp.eval_str(src).unwrap();
    interp.print(val)
}

#[test]
fn boolean_macros() {
    let mut i = interp();
    assert_eq!(run(&mut i, "(and)"), "t");
    assert_eq!(run(&mut i, "(and 1 2 3)"), "3");
    assert_eq!(run(&mut i, "(and 1 () (error \"not reached\"))"), "()");
    assert_eq!(run(&mut i, "(or)"), "()");
    assert_eq!(run(&mut i, "(or () 2 (error \"not reached\"))"), "2");
    assert_eq!(run(&mut i, "(not ())"), "t");
    assert_eq!(run(&mut i, "(let ((value 5)) (or () value))"), "5");
    assert_eq!(run(&mut i, "(let ((more 6)) (or () () more))"), "6");
    assert_eq!(run(&mut i, "(define n 0) (or (begin (set! n (+ n 1)) n) 'never) n"), "1");
    assert_eq!(run(&mut i, "(when (= 1 1) 'a 'b)"), "b");
    assert_eq!(run(&mut i, "(unless (= 1 1) 'a)"), "()");
}

#[test]
fn sequential_let() {
    let mut i = interp();
    assert_eq!(run(&mut i, "(let* ((a 2) (b (+ a 1))) (* a b))"), "6");
    assert_eq!(run(&mut i, "(let* () 7)"), "7");
}

#[test]
fn list_library() {
    let mut i = interp();
    assert_eq!(run(&mut i, "(map (lambda (x) (* x x)) '(1 2 3))"), "(1 4 9)");
    assert_eq!(run(&mut i, "(filter (lambda (x) (> x 2)) '(1 2 3 4))"), "(3 4)");
    assert_eq!(run(&mut i, "(fold + 0 '(1 2 3 4))"), "10");
    assert_eq!(run(&mut i, "(append '(1 2) '(3) '() '(4 5))"), "(1 2 3 4 5)");
    assert_eq!(run(&mut i, "(append)"), "()");
    assert_eq!(run(&mut i, "(length '(a b c))"), "3");
    assert_eq!(run(&mut i, "(nth 1 '(a b c))"), "b");
    assert_eq!(run(&mut i, "(last '(a b c))"), "c");
    assert_eq!(run(&mut i, "(cadr '(a b c))"), "b");
    assert_eq!(run(&mut i, "(caddr '(a b c))"), "c");
}

#[test]
fn structural_equality_and_search() {
    let mut i = interp();
    assert_eq!(run(&mut i, "(equal? '(1 (2 x)) (list 1 (list 2 'x)))"), "t");
    assert_eq!(run(&mut i, "(equal? '(1 2) '(1 3))"), "()");
    assert_eq!(run(&mut i, "(member 'c '(a b c d))"), "(c d)");
    assert_eq!(run(&mut i, "(member 'z '(a b))"), "()");
    assert_eq!(run(&mut i, "(assoc 'b '((a 1) (b 2)))"), "(b 2)");
}

#[test]
fn numeric_helpers() {
    let mut i = interp();
    assert_eq!(run(&mut i, "(abs -4)"), "4");
    assert_eq!(run(&mut i, "(list (<= 2 2) (>= 1 2) (zero? 0))"), "(t () t)");
}

#[test]
fn load_evaluates_a_file() {
    let dir = std::env::temp_dir().join(format!("iota-load-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("lib.l");
    std::fs::write(&path, "(define loaded-value 42)\n(define (twice x) (* 2 x))\n").unwrap();

    let mut i = interp();
    run(&mut i, &format!("(load \"{}\")", path.display()));
    assert_eq!(run(&mut i, "(twice loaded-value)"), "84");

    std::fs::remove_dir_all(&dir).unwrap();
}
