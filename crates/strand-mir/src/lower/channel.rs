// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Channel operations: make, send, receive, close, select.
//!
//! Each operation becomes one runtime call. Descriptors and values are
//! passed through stack slots that live only around the call, so lowered
//! code never allocates on the heap.

use strand_ssa::{ChanDir, Constant, Instr, InstrKind, SelectState, Type, ValueId};

use super::{runtime_fn, select_result_type, LoweringError, MirLowerer};
use crate::{
    BinOp, FunctionRef, LocalId, MirConst, MirOperand, MirRValue, MirStmt, MirTerminator,
    MirType, DIR_RECV, DIR_SEND,
};

/// A stack slot reserved for the duration of one runtime call.
struct Slot {
    addr: LocalId,
    size: u64,
}

fn slot_ptr(slot: &Option<Slot>) -> MirOperand {
    slot.as_ref()
        .map_or(MirOperand::null(), |s| MirOperand::Local(s.addr))
}

impl<'a> MirLowerer<'a> {
    pub(super) fn lower_make_chan(
        &mut self,
        instr: &Instr,
        size: ValueId,
    ) -> Result<(), LoweringError> {
        let options = self.options;
        let layout = &options.layout;
        let chan = self.result_value(instr)?;
        let dst = self.result(instr)?;
        let elem = self
            .result_type(instr)?
            .chan_elem()
            .ok_or(LoweringError::NotAChannel(chan.0))?;

        let half = layout.uintptr_max() >> 1;
        let elem_size = layout.size_of(elem);
        if elem_size > half {
            return Err(LoweringError::UnsupportedType(format!(
                "channel element {} is {} bytes",
                elem, elem_size
            )));
        }
        let max_buf = half / elem_size.max(1);

        let size_ty = self.value_type(size)?;
        if !size_ty.is_integer() {
            return Err(LoweringError::UnsupportedType(format!(
                "channel size of type {}",
                size_ty
            )));
        }

        let count = match self.const_int(size) {
            Some(v) => {
                let n = as_unsigned(v, size_ty, layout.pointer_bytes);
                if n >= max_buf {
                    let size = if size_ty.is_signed() { v as i128 } else { n as i128 };
                    return Err(LoweringError::ChanSizeOutOfRange { size, max: max_buf });
                }
                MirOperand::int(n as i64)
            }
            None => self.chan_bounds_check(size, size_ty, max_buf)?,
        };

        let no_pointers = !elem.has_pointers();
        self.call_runtime(
            Some(dst),
            runtime_fn::CHAN_MAKE,
            vec![
                MirOperand::int(elem_size as i64),
                count,
                MirOperand::bool(no_pointers),
            ],
        );
        log::debug!(
            "lowered make chan v{} (elem {} bytes, no_pointers={})",
            chan.0,
            elem_size,
            no_pointers
        );
        Ok(())
    }

    /// Compare the size against `max_buf` and branch to a panic call when
    /// it is out of range. Returns the size as a `uintptr` in the
    /// continuation block, which becomes the current block.
    fn chan_bounds_check(
        &mut self,
        size: ValueId,
        size_ty: &Type,
        max_buf: u64,
    ) -> Result<MirOperand, LoweringError> {
        let ptr_bytes = self.options.layout.pointer_bytes;
        let cmp_ty = if size_ty.size(ptr_bytes) > ptr_bytes {
            MirType::U64
        } else {
            MirType::Uintptr
        };

        let operand = self.operand(size)?;
        let wide = self.temp(cmp_ty.clone());
        self.assign(
            wide,
            MirRValue::Cast {
                value: operand,
                target_ty: cmp_ty.clone(),
            },
        );
        let oob = self.temp(MirType::Bool);
        self.assign(
            oob,
            MirRValue::BinaryOp {
                op: BinOp::Ge,
                left: MirOperand::Local(wide),
                right: MirOperand::int(max_buf as i64),
            },
        );

        let panic_bb = self.builder.create_block();
        let cont_bb = self.builder.create_block();
        self.builder.terminate(MirTerminator::Branch {
            cond: MirOperand::Local(oob),
            then_block: panic_bb,
            else_block: cont_bb,
        });
        self.builder.switch_to_block(panic_bb);
        self.call_runtime(None, runtime_fn::CHAN_MAKE_PANIC, vec![]);
        self.builder.terminate(MirTerminator::Unreachable);
        self.builder.switch_to_block(cont_bb);

        if cmp_ty == MirType::Uintptr {
            return Ok(MirOperand::Local(wide));
        }
        let n = self.temp(MirType::Uintptr);
        self.assign(
            n,
            MirRValue::Cast {
                value: MirOperand::Local(wide),
                target_ty: MirType::Uintptr,
            },
        );
        Ok(MirOperand::Local(n))
    }

    pub(super) fn lower_send(&mut self, chan: ValueId, value: ValueId) -> Result<(), LoweringError> {
        let elem = self.chan_elem(chan)?;
        let value_slot = self.value_slot("chan.value", elem, Some(value))?;
        let op = self.op_descriptor(chan, slot_ptr(&value_slot), DIR_SEND)?;

        self.call_runtime(None, runtime_fn::CHAN_SEND, vec![MirOperand::Local(op.addr)]);

        self.end_lifetime(&op);
        if let Some(slot) = &value_slot {
            self.end_lifetime(slot);
        }
        log::debug!("lowered send on v{}", chan.0);
        Ok(())
    }

    pub(super) fn lower_recv(
        &mut self,
        instr: &Instr,
        chan: ValueId,
        comma_ok: bool,
    ) -> Result<(), LoweringError> {
        let dst = self.result(instr)?;
        let elem = self.chan_elem(chan)?;
        let elem_ty = self.options.layout.mir_type(elem);
        let value_slot = self.value_slot("chan.value", elem, None)?;
        let op = self.op_descriptor(chan, slot_ptr(&value_slot), DIR_RECV)?;

        let ok = comma_ok.then(|| self.temp(MirType::Bool));
        self.call_runtime(ok, runtime_fn::CHAN_RECV, vec![MirOperand::Local(op.addr)]);

        let received = match &value_slot {
            Some(slot) => MirRValue::Deref(MirOperand::Local(slot.addr)),
            None => MirRValue::Use(MirOperand::Constant(MirConst::Zero(elem_ty.clone()))),
        };
        match ok {
            Some(ok) => {
                let value = self.temp(elem_ty.clone());
                self.assign(value, received);
                self.assign(
                    dst,
                    MirRValue::Aggregate {
                        ty: MirType::Struct(vec![elem_ty, MirType::Bool]),
                        fields: vec![MirOperand::Local(value), MirOperand::Local(ok)],
                    },
                );
            }
            None => self.assign(dst, received),
        }

        self.end_lifetime(&op);
        if let Some(slot) = &value_slot {
            self.end_lifetime(slot);
        }
        log::debug!("lowered recv on v{} (comma_ok={})", chan.0, comma_ok);
        Ok(())
    }

    pub(super) fn lower_close(&mut self, chan: ValueId) -> Result<(), LoweringError> {
        self.chan_elem(chan)?;
        let operand = self.operand(chan)?;
        self.call_runtime(None, runtime_fn::CHAN_CLOSE, vec![operand]);
        log::debug!("lowered close of v{}", chan.0);
        Ok(())
    }

    pub(super) fn lower_select(
        &mut self,
        instr: &Instr,
        states: &[SelectState],
        blocking: bool,
    ) -> Result<(), LoweringError> {
        let select = self.result_value(instr)?;
        let dst = self.result(instr)?;

        if states.is_empty() {
            if blocking {
                // select {} never returns.
                self.call_runtime(None, runtime_fn::DEADLOCK, vec![]);
                self.builder.terminate(MirTerminator::Unreachable);
                let dead = self.builder.create_block();
                self.builder.switch_to_block(dead);
                self.assign(
                    dst,
                    MirRValue::Use(MirOperand::Constant(MirConst::Zero(select_result_type()))),
                );
            } else {
                self.assign(
                    dst,
                    MirRValue::Aggregate {
                        ty: select_result_type(),
                        fields: vec![MirOperand::int(-1), MirOperand::bool(false)],
                    },
                );
            }
            self.select_buffers.insert(select, MirOperand::null());
            log::debug!("lowered empty select v{} (blocking={})", select.0, blocking);
            return Ok(());
        }

        let options = self.options;
        let layout = &options.layout;

        // One buffer, big enough for any received element.
        let mut recv_size = 0u64;
        let mut recv_align = 1u64;
        for state in states {
            let elem = self.chan_elem(state.chan)?;
            if state.dir == ChanDir::Recv {
                recv_size = recv_size.max(layout.size_of(elem));
                recv_align = recv_align.max(layout.align_of(elem));
            }
        }

        let mut send_slots = Vec::new();
        let mut value_ptrs = Vec::with_capacity(states.len());
        for state in states {
            match (state.dir, state.send) {
                (ChanDir::Send, Some(value)) => {
                    // Zero-sized values still get a slot: a null value
                    // pointer is what marks a receive branch.
                    let elem = self.chan_elem(state.chan)?;
                    let slot = self.send_value_slot(elem, value)?;
                    value_ptrs.push(MirOperand::Local(slot.addr));
                    send_slots.push(slot);
                }
                (ChanDir::Recv, None) => value_ptrs.push(MirOperand::null()),
                _ => {
                    return Err(LoweringError::InvalidConstruct(format!(
                        "select branch on v{} has mismatched direction and value",
                        state.chan.0
                    )))
                }
            }
        }

        let recvbuf = (recv_size > 0).then(|| self.stack_slot("select.buf", recv_size, recv_align));
        let recvbuf_ptr = slot_ptr(&recvbuf);

        let n = states.len() as u64;
        let st = layout.select_state_layout();
        let states_slot = self.stack_slot("select.states", st.size * n, st.align);
        for (i, (state, value_ptr)) in states.iter().zip(value_ptrs).enumerate() {
            let base = (i as u64 * st.size) as u32;
            let chan = self.operand(state.chan)?;
            self.store(states_slot.addr, base + st.chan_offset, chan);
            self.store(states_slot.addr, base + st.value_offset, value_ptr);
        }

        // Scratch descriptors for parking on every branch at once.
        let ops = blocking.then(|| {
            let d = layout.descriptor_layout();
            self.stack_slot("select.block", d.size * n, d.align)
        });
        let ops_len = if blocking { n as i64 } else { 0 };

        self.call_runtime(
            Some(dst),
            runtime_fn::CHAN_SELECT,
            vec![
                recvbuf_ptr.clone(),
                MirOperand::Local(states_slot.addr),
                MirOperand::int(n as i64),
                slot_ptr(&ops),
                MirOperand::int(ops_len),
            ],
        );

        self.end_lifetime(&states_slot);
        if let Some(ops) = &ops {
            self.end_lifetime(ops);
        }
        for slot in &send_slots {
            self.end_lifetime(slot);
        }

        self.select_buffers.insert(select, recvbuf_ptr);
        log::debug!(
            "lowered select v{} ({} branches, blocking={}, buffer {} bytes)",
            select.0,
            n,
            blocking,
            recv_size
        );
        Ok(())
    }

    pub(super) fn lower_extract(
        &mut self,
        instr: &Instr,
        tuple: ValueId,
        index: u32,
    ) -> Result<(), LoweringError> {
        let dst = self.result(instr)?;
        let invalid = LoweringError::InvalidExtract {
            tuple: tuple.0,
            index,
        };
        let (Type::Tuple(fields) | Type::Struct(fields)) = self.value_type(tuple)? else {
            return Err(invalid);
        };
        if index as usize >= fields.len() {
            return Err(invalid);
        }

        let base = self.operand(tuple)?;
        let from_select = matches!(
            self.func.definition(tuple).map(|i| &i.kind),
            Some(InstrKind::Select { .. })
        );
        if !from_select {
            self.assign(dst, MirRValue::Field { base, field_index: index });
            return Ok(());
        }

        let result_ty = self.options.layout.mir_type(self.result_type(instr)?);
        match index {
            0 => {
                let raw = self.temp(MirType::I32);
                self.assign(raw, MirRValue::Field { base, field_index: 0 });
                self.assign(
                    dst,
                    MirRValue::Cast {
                        value: MirOperand::Local(raw),
                        target_ty: result_ty,
                    },
                );
            }
            1 => self.assign(dst, MirRValue::Field { base, field_index: 1 }),
            _ => {
                let buf = self
                    .select_buffers
                    .get(&tuple)
                    .cloned()
                    .ok_or(LoweringError::MissingSelectBuffer(tuple.0))?;
                let rvalue = match buf {
                    MirOperand::Constant(MirConst::NullPtr) => {
                        MirRValue::Use(MirOperand::Constant(MirConst::Zero(result_ty)))
                    }
                    buf => MirRValue::Deref(buf),
                };
                self.assign(dst, rvalue);
            }
        }
        Ok(())
    }

    fn chan_elem(&self, chan: ValueId) -> Result<&'a Type, LoweringError> {
        self.value_type(chan)?
            .chan_elem()
            .ok_or(LoweringError::NotAChannel(chan.0))
    }

    /// Integer value of `value` if it is defined by a constant.
    fn const_int(&self, value: ValueId) -> Option<i64> {
        match self.func.definition(value).map(|i| &i.kind) {
            Some(InstrKind::Const(Constant::Int(v))) => Some(*v),
            Some(InstrKind::Const(Constant::Zero)) => Some(0),
            _ => None,
        }
    }

    fn stack_slot(&mut self, name: &str, size: u64, align: u64) -> Slot {
        let addr = self.builder.alloc_local(name.to_string(), MirType::Ptr);
        self.builder.push_stmt(MirStmt::StackSlot {
            dst: addr,
            name: name.to_string(),
            size,
            align,
        });
        Slot { addr, size }
    }

    /// Slot for one element, filled with `value` if given. Zero-sized
    /// elements get no slot; the runtime is passed a null pointer instead.
    fn value_slot(
        &mut self,
        name: &str,
        elem: &Type,
        value: Option<ValueId>,
    ) -> Result<Option<Slot>, LoweringError> {
        let layout = &self.options.layout;
        let (size, align) = (layout.size_of(elem), layout.align_of(elem));
        if size == 0 {
            return Ok(None);
        }
        let value = value.map(|v| self.operand(v)).transpose()?;
        let slot = self.stack_slot(name, size, align);
        if let Some(value) = value {
            self.store(slot.addr, 0, value);
        }
        Ok(Some(slot))
    }

    /// Slot holding the value of a select send branch. Unlike
    /// `value_slot` this always exists, even when it is zero bytes wide.
    fn send_value_slot(&mut self, elem: &Type, value: ValueId) -> Result<Slot, LoweringError> {
        let layout = &self.options.layout;
        let (size, align) = (layout.size_of(elem), layout.align_of(elem));
        let value = self.operand(value)?;
        let slot = self.stack_slot("select.send.value", size, align);
        if size > 0 {
            self.store(slot.addr, 0, value);
        }
        Ok(slot)
    }

    fn op_descriptor(
        &mut self,
        chan: ValueId,
        value_ptr: MirOperand,
        dir: i64,
    ) -> Result<Slot, LoweringError> {
        let d = self.options.layout.descriptor_layout();
        let chan = self.operand(chan)?;
        let op = self.stack_slot("chan.op", d.size, d.align);
        self.store(op.addr, d.chan_offset, chan);
        self.store(op.addr, d.value_offset, value_ptr);
        if let Some(offset) = d.dir_offset {
            self.store(op.addr, offset, MirOperand::int(dir));
        }
        Ok(op)
    }

    fn store(&mut self, addr: LocalId, offset: u32, value: MirOperand) {
        self.builder.push_stmt(MirStmt::Store { addr, offset, value });
    }

    fn end_lifetime(&mut self, slot: &Slot) {
        if self.options.lifetime_markers {
            self.builder.push_stmt(MirStmt::LifetimeEnd {
                slot: slot.addr,
                size: slot.size,
            });
        }
    }

    fn call_runtime(&mut self, dst: Option<LocalId>, name: &str, args: Vec<MirOperand>) {
        self.builder.push_stmt(MirStmt::Call {
            dst,
            func: FunctionRef::extern_c(name.to_string()),
            args,
        });
    }
}

/// Bit pattern of an integer constant as an unsigned number: sign-extended
/// for signed types, truncated to the type's width otherwise.
fn as_unsigned(v: i64, ty: &Type, ptr_bytes: u64) -> u64 {
    let bits = ty.size(ptr_bytes) * 8;
    if ty.is_signed() || bits >= 64 {
        v as u64
    } else {
        (v as u64) & ((1u64 << bits) - 1)
    }
}
