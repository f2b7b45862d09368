use epsvg_graphics::path::{PaintKind, PathOp};
use kurbo::Point;

use super::*;
use crate::error::ErrorKind;
use crate::value::Value;

fn run(src: &str) -> Machine {
    let mut m = Machine::new();
    m.run(src).unwrap();
    m
}

fn run_err(src: &str) -> crate::error::MachineError {
    let mut m = Machine::new();
    m.run(src).unwrap_err()
}

fn scalar(m: &Machine, i: usize) -> f64 {
    m.operands()[i].as_scalar().unwrap()
}

#[test]
fn arithmetic_promotion() {
    let m = run("1 2 add 1 2.0 add 5 2 idiv 5 2 div 9 sqrt");
    assert!(matches!(m.operands()[0], Value::Integer(3)));
    assert!(matches!(m.operands()[1], Value::Real(_)));
    assert_eq!(scalar(&m, 1), 3.0);
    assert!(matches!(m.operands()[2], Value::Integer(2)));
    assert!(matches!(m.operands()[3], Value::Real(_)));
    assert_eq!(scalar(&m, 3), 2.5);
    assert_eq!(scalar(&m, 4), 3.0);
}

#[test]
fn round_and_truncate_preserve_integer_operands() {
    let m = run("5 round 2.6 round 7 truncate 2.6 truncate");
    assert!(matches!(m.operands()[0], Value::Integer(5)));
    assert!(matches!(m.operands()[1], Value::Real(_)));
    assert_eq!(scalar(&m, 1), 3.0);
    assert!(matches!(m.operands()[2], Value::Integer(7)));
    assert_eq!(scalar(&m, 3), 2.0);
}

#[test]
fn division_by_zero_is_fatal() {
    assert_eq!(run_err("1 0 div").kind, ErrorKind::Arithmetic);
    assert_eq!(run_err("1 0 idiv").kind, ErrorKind::Arithmetic);
    assert_eq!(run_err("1 0 mod").kind, ErrorKind::Arithmetic);
}

#[test]
fn equality_across_kinds() {
    let m = run("1 1.0 eq (a) (a) eq (a) (b) ne /x /x eq");
    for v in m.operands() {
        assert!(matches!(v, Value::Boolean(true)), "{v}");
    }
}

#[test]
fn scope_resolution_innermost_first() {
    let m = run("/x 1 def 2 dict begin /x 2 def x end x");
    assert!(matches!(m.operands(), [Value::Integer(2), Value::Integer(1)]));
}

#[test]
fn user_definition_shadows_operator() {
    let m = run("/add { mul } def 3 4 add");
    assert!(matches!(m.operands(), [Value::Integer(12)]));
}

#[test]
fn def_without_begin_lands_in_userdict() {
    let m = run("/y 7 def userdict /y known");
    assert!(matches!(m.operands(), [Value::Boolean(true)]));
}

#[test]
fn load_and_where() {
    let m = run("/v 3 def /v load");
    assert!(matches!(m.operands(), [Value::Integer(3)]));

    let m = run("/moveto where");
    assert_eq!(m.operands().len(), 2);
    assert!(matches!(m.operands()[0], Value::Dictionary(_)));
    assert!(matches!(m.operands()[1], Value::Boolean(true)));

    let m = run("/nosuch where");
    assert!(matches!(m.operands(), [Value::Boolean(false)]));
}

#[test]
fn save_restore_restores_operands() {
    let m = run("10 save 99 exch restore");
    assert!(matches!(m.operands(), [Value::Integer(10)]));
}

#[test]
fn save_snapshots_are_deep() {
    // The array is mutated after save; restore must yield the saved
    // contents, not the live handle.
    let m = run("1 array dup 0 5 put save 1 index 0 99 put restore 0 get");
    assert!(matches!(m.operands(), [Value::Integer(5)]));
}

#[test]
fn restore_discards_recorded_graphics() {
    let m = run("save 10 10 moveto 20 20 lineto fill restore");
    assert!(m.graphics.current().paths.is_empty());
}

#[test]
fn bind_captures_definitions_early() {
    let bound = run("/f { add } bind def /add { mul } def 3 4 f");
    assert!(matches!(bound.operands(), [Value::Integer(7)]));

    let unbound = run("/f { add } def /add { mul } def 3 4 f");
    assert!(matches!(unbound.operands(), [Value::Integer(12)]));
}

#[test]
fn loop_runs_until_exit() {
    let m = run("/i 0 def { /i i 1 add def i 3 ge { exit } if } loop i");
    assert!(matches!(m.operands(), [Value::Integer(3)]));
}

#[test]
fn exit_stops_only_the_innermost_loop() {
    let m = run("0 { { exit } loop 1 add dup 3 ge { exit } if } loop");
    assert!(matches!(m.operands(), [Value::Integer(3)]));
}

#[test]
fn stopped_reports_stop() {
    let m = run("{ 1 stop 2 } stopped");
    assert!(matches!(
        m.operands(),
        [Value::Integer(1), Value::Boolean(true)]
    ));

    let m = run("{ 3 } stopped");
    assert!(matches!(
        m.operands(),
        [Value::Integer(3), Value::Boolean(false)]
    ));
}

#[test]
fn stop_propagates_through_procedure_calls() {
    let m = run("/f { stop } def { f 99 } stopped");
    assert!(matches!(m.operands(), [Value::Boolean(true)]));
}

#[test]
fn control_signal_at_top_level_is_fatal() {
    assert_eq!(run_err("exit").kind, ErrorKind::ControlFlow);
    assert_eq!(run_err("stop").kind, ErrorKind::ControlFlow);
}

#[test]
fn roll_rotates_toward_the_top() {
    let m = run("1 2 3 3 1 roll");
    assert!(matches!(
        m.operands(),
        [Value::Integer(3), Value::Integer(1), Value::Integer(2)]
    ));

    let m = run("1 2 3 3 -1 roll");
    assert!(matches!(
        m.operands(),
        [Value::Integer(2), Value::Integer(3), Value::Integer(1)]
    ));
}

#[test]
fn roll_validates_its_span() {
    assert_eq!(run_err("1 2 5 1 roll").kind, ErrorKind::StackUnderflow);
    assert_eq!(run_err("1 -1 1 roll").kind, ErrorKind::IndexOutOfRange);
}

#[test]
fn copy_duplicates_in_order() {
    let m = run("1 2 3 2 copy");
    assert!(matches!(
        m.operands(),
        [
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(2),
            Value::Integer(3)
        ]
    ));
    assert_eq!(run_err("1 5 copy").kind, ErrorKind::StackUnderflow);
}

#[test]
fn index_reaches_down_the_stack() {
    let m = run("1 2 3 1 index");
    assert!(matches!(m.operands().last(), Some(Value::Integer(2))));
    assert_eq!(run_err("1 2 5 index").kind, ErrorKind::StackUnderflow);
}

#[test]
fn mark_counting_and_clearing() {
    let m = run("mark 1 2 3 counttomark");
    assert!(matches!(m.operands().last(), Some(Value::Integer(3))));

    let m = run("1 mark 2 3 cleartomark");
    assert!(matches!(m.operands(), [Value::Integer(1)]));

    assert_eq!(run_err("cleartomark").kind, ErrorKind::StackUnderflow);
}

#[test]
fn array_construction_nests() {
    let m = run("[ 1 2 [ 3 ] ]");
    let [Value::Array(outer)] = m.operands() else {
        panic!("expected one array, got {:?}", m.operands());
    };
    assert_eq!(outer.len(), 3);
    let Some(Value::Array(inner)) = outer.get(2) else {
        panic!("expected nested array");
    };
    assert_eq!(inner.len(), 1);
}

#[test]
fn procedure_literal_is_pushed_not_run() {
    let m = run("{ 1 2 add }");
    assert!(matches!(m.operands(), [Value::Procedure(_)]));
}

#[test]
fn construction_works_inside_a_procedure_body() {
    let m = run("true { [ 1 2 ] } if");
    let [Value::Array(arr)] = m.operands() else {
        panic!("expected one array, got {:?}", m.operands());
    };
    assert_eq!(arr.len(), 2);
}

#[test]
fn undefined_name_is_fatal_with_position() {
    let err = run_err("1 2\nqux");
    assert_eq!(err.kind, ErrorKind::UndefinedName);
    assert_eq!(err.position, Some((2, 1)));
    assert!(err.message.contains("qux"), "{}", err.message);
}

#[test]
fn unclosed_builder_is_fatal() {
    assert_eq!(run_err("{ 1 2").kind, ErrorKind::Lexical);
    assert_eq!(run_err("[ 1 2").kind, ErrorKind::Lexical);
}

#[test]
fn mismatched_builder_close_is_fatal() {
    assert_eq!(run_err("[ 1 }").kind, ErrorKind::TypeMismatch);
    assert_eq!(run_err("1 ]").kind, ErrorKind::StackUnderflow);
}

#[test]
fn string_operations() {
    let m = run("(hello) length");
    assert!(matches!(m.operands(), [Value::Integer(5)]));

    let m = run("(abc) 1 get");
    assert!(matches!(m.operands(), [Value::Integer(98)]));

    let m = run("(abc) 1 1 getinterval");
    let [Value::String(s)] = m.operands() else {
        panic!("expected a string");
    };
    assert_eq!(s.to_text(), "b");
}

#[test]
fn getinterval_aliases_the_original() {
    // Writing through the sub-view lands at index 1 of the original.
    let m = run("(abcd) dup 1 2 getinterval 0 88 put 1 get");
    assert!(matches!(m.operands(), [Value::Integer(88)]));
}

#[test]
fn anchorsearch_splits_on_match() {
    let m = run("(foobar) (foo) anchorsearch");
    assert_eq!(m.operands().len(), 3);
    let (Value::String(post), Value::String(matched)) =
        (&m.operands()[0], &m.operands()[1])
    else {
        panic!("expected two strings");
    };
    assert_eq!(post.to_text(), "bar");
    assert_eq!(matched.to_text(), "foo");
    assert!(matches!(m.operands()[2], Value::Boolean(true)));

    let m = run("(foobar) (bar) anchorsearch");
    assert!(matches!(m.operands()[1], Value::Boolean(false)));
}

#[test]
fn hex_strings_decode() {
    let m = run("<48 65 6C6C 6F>");
    let [Value::String(s)] = m.operands() else {
        panic!("expected a string");
    };
    assert_eq!(s.to_text(), "Hello");

    // An odd trailing digit is padded with a low zero nibble.
    let m = run("<4>");
    let [Value::String(s)] = m.operands() else {
        panic!("expected a string");
    };
    assert_eq!(s.to_vec(), vec![0x40]);
}

#[test]
fn dict_get_and_put() {
    let m = run("2 dict dup /k 5 put /k get");
    assert!(matches!(m.operands(), [Value::Integer(5)]));

    let err = run_err("1 dict /missing get");
    assert_eq!(err.kind, ErrorKind::UndefinedName);
}

#[test]
fn astore_and_aload_round_trip() {
    let m = run("1 2 3 3 array astore aload");
    assert_eq!(m.operands().len(), 4);
    assert!(matches!(m.operands()[0], Value::Integer(1)));
    assert!(matches!(m.operands()[2], Value::Integer(3)));
    assert!(matches!(m.operands()[3], Value::Array(_)));
}

#[test]
fn graphics_pipeline_records_a_fill() {
    let m = run("newpath 10 10 moveto 20 10 lineto 20 20 lineto closepath fill");
    let paths = &m.graphics.current().paths;
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].paint_calls.len(), 1);
    let call = &paths[0].paint_calls[0];
    assert_eq!(call.kind, PaintKind::Fill);
    assert_eq!(
        call.sub_paths[0].ops,
        vec![
            PathOp::MoveTo(Point::new(10.0, 10.0)),
            PathOp::LineTo(Point::new(20.0, 10.0)),
            PathOp::LineTo(Point::new(20.0, 20.0)),
            PathOp::Close,
        ]
    );
}

#[test]
fn curveto_records_three_control_points() {
    let m = run("0 0 moveto 1 1 2 2 3 3 curveto");
    let ops = &m.graphics.current().paths[0].sub_paths[0].ops;
    assert_eq!(
        ops[1],
        PathOp::CurveTo(
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0)
        )
    );
}

#[test]
fn scale_applies_to_transform() {
    let m = run("2 3 scale 10 10 transform");
    assert_eq!(scalar(&m, 0), 20.0);
    assert_eq!(scalar(&m, 1), 30.0);
}

#[test]
fn matrix_literals_invert() {
    let m = run("[ 2.0 0.0 0.0 2.0 0.0 0.0 ] matrix invertmatrix");
    let [Value::Matrix(inv)] = m.operands() else {
        panic!("expected a matrix");
    };
    assert_eq!(inv.as_coeffs(), [0.5, 0.0, 0.0, 0.5, 0.0, 0.0]);
}

#[test]
fn currentmatrix_reads_the_ctm() {
    let m = run("3 4 translate matrix currentmatrix");
    let [Value::Matrix(ctm)] = m.operands() else {
        panic!("expected a matrix");
    };
    assert_eq!(ctm.as_coeffs(), [1.0, 0.0, 0.0, 1.0, 3.0, 4.0]);
}

#[test]
fn unbalanced_grestore_is_fatal() {
    assert_eq!(run_err("grestore").kind, ErrorKind::StackUnderflow);
}

#[test]
fn findfont_returns_a_stub() {
    let m = run("/Helvetica findfont /Encoding get length");
    assert!(matches!(m.operands(), [Value::Integer(256)]));
}

#[test]
fn unbounded_recursion_is_caught() {
    let err = run_err("/f { f } def f");
    assert_eq!(err.kind, ErrorKind::RecursionLimit);
}

#[test]
fn comments_and_page_tags_are_inert() {
    let m = run("%!PS-Adobe-3.0 EPSF-3.0\n1 % trailing comment\n2 add");
    assert!(matches!(m.operands(), [Value::Integer(3)]));
}
