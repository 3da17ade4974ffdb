// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Whole-function lowering of channel programs.

use strand_mir::lower::{lower_program, runtime_fn, LoweringError, MirLowerer};
use strand_mir::{
    LowerOptions, MirConst, MirFunction, MirOperand, MirRValue, MirStmt, MirTerminator, MirType,
    TargetLayout,
};
use strand_ssa::{FunctionBuilder, IntWidth, Program, SelectState, SsaFunction, Type};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lower(func: &SsaFunction, layout: TargetLayout) -> MirFunction {
    init();
    MirLowerer::lower_function(func, &LowerOptions::new(layout)).expect("lowering failed")
}

fn runtime_calls(mir: &MirFunction) -> Vec<String> {
    mir.statements()
        .filter_map(|s| match s {
            MirStmt::Call { func, .. } if func.is_extern => Some(func.name.clone()),
            _ => None,
        })
        .collect()
}

fn slot_names(mir: &MirFunction) -> Vec<String> {
    mir.statements()
        .filter_map(|s| match s {
            MirStmt::StackSlot { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// ch := make(chan int, 1); ch <- x; v, ok := <-ch; close(ch); return v
fn ping(x_ty: Type) -> SsaFunction {
    let mut b = FunctionBuilder::new("ping", x_ty.clone());
    let x = b.param("x", x_ty.clone());
    let one = b.const_int(Type::INT, 1);
    let ch = b.make_chan(x_ty, one);
    b.send(ch, x);
    let pair = b.recv_ok(ch);
    let v = b.extract(pair, 0);
    b.extract(pair, 1);
    b.close(ch);
    b.ret(Some(v));
    b.finish()
}

#[test]
fn runtime_names_match_the_runtime() {
    assert_eq!(runtime_fn::ALL, strand_rt::abi::ENTRY_POINTS);
}

#[test]
fn send_recv_close_round_trip() {
    let mir = lower(&ping(Type::INT), TargetLayout::x86_64());
    assert_eq!(
        runtime_calls(&mir),
        vec![
            runtime_fn::CHAN_MAKE,
            runtime_fn::CHAN_SEND,
            runtime_fn::CHAN_RECV,
            runtime_fn::CHAN_CLOSE
        ]
    );
    assert_eq!(
        slot_names(&mir),
        vec!["chan.value", "chan.op", "chan.value", "chan.op"]
    );

    // Every slot dies again.
    let starts = mir
        .statements()
        .filter(|s| matches!(s, MirStmt::StackSlot { .. }))
        .count();
    let ends = mir
        .statements()
        .filter(|s| matches!(s, MirStmt::LifetimeEnd { .. }))
        .count();
    assert_eq!(starts, ends);
}

#[test]
fn every_value_is_assigned_once() {
    let func = ping(Type::int(IntWidth::W32, true));
    let mir = lower(&func, TargetLayout::wasm32());
    let mut assigned = std::collections::HashMap::new();
    for stmt in mir.statements() {
        let dst = match stmt {
            MirStmt::Assign { dst, .. } | MirStmt::StackSlot { dst, .. } => Some(*dst),
            MirStmt::Call { dst, .. } => *dst,
            _ => None,
        };
        if let Some(dst) = dst {
            *assigned.entry(dst).or_insert(0) += 1;
        }
    }
    assert!(assigned.values().all(|&n| n == 1), "{}", mir);
}

#[test]
fn descriptors_follow_target_pointer_width() {
    let mir = lower(&ping(Type::INT), TargetLayout::thumbv7m());
    let op_sizes: Vec<u64> = mir
        .statements()
        .filter_map(|s| match s {
            MirStmt::StackSlot { name, size, .. } if name == "chan.op" => Some(*size),
            _ => None,
        })
        .collect();
    assert_eq!(op_sizes, vec![12, 12]);
    assert!(mir.statements().any(|s| matches!(
        s,
        MirStmt::Store { offset: 8, value: MirOperand::Constant(MirConst::Int(1)), .. }
    )));
}

#[test]
fn zero_sized_receive_yields_zero_value() {
    let mut b = FunctionBuilder::new("wait", Type::Void);
    let ch = b.param("done", Type::chan(Type::Struct(vec![])));
    b.recv(ch);
    b.ret(None);
    let mir = lower(&b.finish(), TargetLayout::x86_64());
    assert_eq!(slot_names(&mir), vec!["chan.op"]);
    assert!(mir.statements().any(|s| matches!(
        s,
        MirStmt::Assign {
            rvalue: MirRValue::Use(MirOperand::Constant(MirConst::Zero(MirType::Struct(_)))),
            ..
        }
    )));
}

#[test]
fn blocking_select_reads_from_shared_buffer() {
    let mut b = FunctionBuilder::new("choose", Type::INT);
    let a = b.param("a", Type::chan(Type::int(IntWidth::W8, false)));
    let c = b.param("c", Type::chan(Type::int(IntWidth::W64, true)));
    let out = b.param("out", Type::chan(Type::Bool));
    let flag = b.const_bool(true);
    let sel = b.select(
        vec![
            SelectState::recv(a),
            SelectState::send(out, flag),
            SelectState::recv(c),
        ],
        true,
    );
    let index = b.extract(sel, 0);
    b.extract(sel, 1);
    b.extract(sel, 2);
    b.extract(sel, 3);
    b.ret(Some(index));
    let mir = lower(&b.finish(), TargetLayout::x86_64());

    assert_eq!(runtime_calls(&mir), vec![runtime_fn::CHAN_SELECT]);
    assert_eq!(
        slot_names(&mir),
        vec!["select.send.value", "select.buf", "select.states", "select.block"]
    );
    let sizes: Vec<(u64, u64)> = mir
        .statements()
        .filter_map(|s| match s {
            MirStmt::StackSlot { size, align, .. } => Some((*size, *align)),
            _ => None,
        })
        .collect();
    // bool value, 8-byte receive buffer, 3 states, 3 scratch ops
    assert_eq!(sizes, vec![(1, 1), (8, 8), (48, 8), (72, 8)]);

    let call_args = mir.statements().find_map(|s| match s {
        MirStmt::Call { args, .. } => Some(args.clone()),
        _ => None,
    });
    let call_args = call_args.expect("select call");
    assert_eq!(call_args[2], MirOperand::int(3));
    assert_eq!(call_args[4], MirOperand::int(3));

    // Both receive extracts load from the same buffer.
    let loads: Vec<&MirOperand> = mir
        .statements()
        .filter_map(|s| match s {
            MirStmt::Assign { rvalue: MirRValue::Deref(buf), .. } => Some(buf),
            _ => None,
        })
        .collect();
    assert_eq!(loads.len(), 2);
    assert_eq!(loads[0], loads[1]);
    assert_eq!(loads[0], &call_args[0]);

    // The branch index is widened to a native int.
    assert!(mir.statements().any(|s| matches!(
        s,
        MirStmt::Assign { rvalue: MirRValue::Cast { target_ty: MirType::Int, .. }, .. }
    )));
}

#[test]
fn non_blocking_select_has_no_scratch_ops() {
    let mut b = FunctionBuilder::new("poll", Type::Void);
    let a = b.param("a", Type::chan(Type::INT));
    b.select(vec![SelectState::recv(a)], false);
    b.ret(None);
    let mir = lower(&b.finish(), TargetLayout::x86_64());
    assert_eq!(slot_names(&mir), vec!["select.buf", "select.states"]);
    let args = mir
        .statements()
        .find_map(|s| match s {
            MirStmt::Call { args, .. } => Some(args.clone()),
            _ => None,
        })
        .expect("select call");
    assert_eq!(args[3], MirOperand::null());
    assert_eq!(args[4], MirOperand::int(0));
}

/// Value pointers stored into the select state array, in branch order.
fn state_value_ptrs(mir: &MirFunction, ptr_bytes: u32) -> Vec<MirOperand> {
    let states = mir
        .statements()
        .find_map(|s| match s {
            MirStmt::StackSlot { dst, name, .. } if name == "select.states" => Some(*dst),
            _ => None,
        })
        .expect("select.states slot");
    mir.statements()
        .filter_map(|s| match s {
            MirStmt::Store { addr, offset, value }
                if *addr == states && (offset / ptr_bytes) % 2 == 1 =>
            {
                Some(value.clone())
            }
            _ => None,
        })
        .collect()
}

#[test]
fn zero_sized_send_branch_is_not_a_receive() {
    let unit = Type::Struct(vec![]);
    let mut b = FunctionBuilder::new("signal", Type::Void);
    let done = b.param("done", Type::chan(unit.clone()));
    let c = b.param("c", Type::chan(Type::INT));
    let token = b.zero(unit);
    b.select(vec![SelectState::send(done, token), SelectState::recv(c)], true);
    b.ret(None);
    let mir = lower(&b.finish(), TargetLayout::x86_64());

    assert_eq!(
        slot_names(&mir),
        vec!["select.send.value", "select.buf", "select.states", "select.block"]
    );
    assert!(mir.statements().any(|s| matches!(
        s,
        MirStmt::StackSlot { name, size: 0, .. } if name == "select.send.value"
    )));
    let ptrs = state_value_ptrs(&mir, 8);
    assert_eq!(ptrs.len(), 2);
    assert!(matches!(ptrs[0], MirOperand::Local(_)), "{}", mir);
    assert_eq!(ptrs[1], MirOperand::null());

    // The same select with a receive in the first branch stores null there.
    let mut b = FunctionBuilder::new("wait", Type::Void);
    let done = b.param("done", Type::chan(Type::Struct(vec![])));
    let c = b.param("c", Type::chan(Type::INT));
    b.select(vec![SelectState::recv(done), SelectState::recv(c)], true);
    b.ret(None);
    let recv_mir = lower(&b.finish(), TargetLayout::x86_64());
    assert_eq!(
        state_value_ptrs(&recv_mir, 8),
        vec![MirOperand::null(), MirOperand::null()]
    );
}

#[test]
fn empty_blocking_select_deadlocks() {
    let mut b = FunctionBuilder::new("forever", Type::Void);
    b.select(vec![], true);
    b.ret(None);
    let mir = lower(&b.finish(), TargetLayout::x86_64());
    assert_eq!(runtime_calls(&mir), vec![runtime_fn::DEADLOCK]);
    assert_eq!(mir.blocks[0].terminator, MirTerminator::Unreachable);
    // The rest of the function lands in a block nothing jumps to.
    assert_eq!(mir.blocks.len(), 2);
    assert_eq!(mir.blocks[1].terminator, MirTerminator::Return { value: None });
}

#[test]
fn extract_past_select_result_is_rejected() {
    let mut b = FunctionBuilder::new("bad", Type::Void);
    let a = b.param("a", Type::chan(Type::INT));
    let sel = b.select(vec![SelectState::recv(a)], false);
    b.extract(sel, 5);
    b.ret(None);
    let err = MirLowerer::lower_function(&b.finish(), &LowerOptions::default()).unwrap_err();
    assert_eq!(err, LoweringError::InvalidExtract { tuple: sel.0, index: 5 });
}

#[test]
fn send_on_non_channel_is_rejected() {
    let mut b = FunctionBuilder::new("bad", Type::Void);
    let x = b.param("x", Type::INT);
    b.send(x, x);
    b.ret(None);
    let err = MirLowerer::lower_function(&b.finish(), &LowerOptions::default()).unwrap_err();
    assert_eq!(err, LoweringError::NotAChannel(x.0));
}

#[test]
fn channel_size_limit_depends_on_target() {
    // 2^31 one-byte elements fit on a 64-bit target but not on a 32-bit one.
    let mut b = FunctionBuilder::new("big", Type::Void);
    let n = b.const_int(Type::int(IntWidth::W64, true), 1 << 31);
    b.make_chan(Type::Bool, n);
    b.ret(None);
    let func = b.finish();

    assert!(MirLowerer::lower_function(&func, &LowerOptions::new(TargetLayout::x86_64())).is_ok());
    let err = MirLowerer::lower_function(&func, &LowerOptions::new(TargetLayout::wasm32()))
        .unwrap_err();
    assert_eq!(
        err,
        LoweringError::ChanSizeOutOfRange {
            size: 1 << 31,
            max: (u32::MAX >> 1) as u64,
        }
    );
}

#[test]
fn program_lowers_every_function() {
    let program = Program {
        functions: vec![ping(Type::INT), ping(Type::F64)],
    };
    let mirs = lower_program(&program, &LowerOptions::default()).expect("lowering failed");
    assert_eq!(mirs.len(), 2);
    let text = mirs[1].to_string();
    assert!(text.starts_with("func ping(x: f64) -> f64 {"), "{}", text);
    assert!(text.contains("extern rt_chan_make(8, 1, true)"), "{}", text);
}
