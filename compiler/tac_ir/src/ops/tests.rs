use super::*;

#[test]
fn every_compound_form_has_a_binary_op() {
    let compound: Vec<_> = AssignOp::VALUE_FORMS
        .iter()
        .filter_map(|op| op.binary_op())
        .collect();
    assert_eq!(compound.len(), 12);
    assert_eq!(AssignOp::Assign.binary_op(), None);
    assert_eq!(AssignOp::RefAssign.binary_op(), None);
}

#[test]
fn rotate_forms_map_to_rotate_ops() {
    assert_eq!(
        AssignOp::RotateLeft.binary_op(),
        Some(BinaryOp::RotateLeft)
    );
    assert_eq!(BinaryOp::RotateRight.symbol(), ">>>");
}

#[test]
fn comparisons_are_flagged() {
    assert!(BinaryOp::LtEq.is_comparison());
    assert!(!BinaryOp::BitXor.is_comparison());
}
