// uVM: featherweight bytecode virtual machine.
//
// Copyright (C) 2020  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::env::args;
use std::process::exit;

use uvm::bytecode::{self, inst, inst1, push_int, Opcode, Program};
use uvm::config::{self, VmConfig};
use uvm::vm::{StdConsole, VM};

// A built-in program for running without arguments: print 0..=4, then
// greet.
fn demo_program() -> Program {
    let mut p = Program::new(vec![
        push_int(0),                      // 0
        inst1(Opcode::StoreGlobal, 0),    // 1
        inst1(Opcode::LoadGlobal, 0),     // 2  loop head
        push_int(5),                      // 3
        inst(Opcode::Lt),                 // 4
        inst1(Opcode::JumpIfFalse, 13),   // 5
        inst1(Opcode::LoadGlobal, 0),     // 6
        inst(Opcode::Print),              // 7
        inst1(Opcode::LoadGlobal, 0),     // 8
        push_int(1),                      // 9
        inst(Opcode::Add),                // 10
        inst1(Opcode::StoreGlobal, 0),    // 11
        inst1(Opcode::Jump, 2),           // 12
        inst(Opcode::Nop),                // 13
    ]);
    p.push_str("hello from the vm");      // 14
    p.code.push(inst(Opcode::Print));     // 15
    p.code.push(inst(Opcode::GcCollect)); // 16
    p.code.push(inst(Opcode::Halt));      // 17
    p
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let program = match args().nth(1) {
        Some(path) => bytecode::load(path).expect("couldn't load program"),
        None => demo_program(),
    };
    let config = match args().nth(2) {
        Some(path) => config::load(path).expect("couldn't load config"),
        None => VmConfig::default(),
    };

    let mut vm = VM::new(program, config);
    let mut console = StdConsole;
    match vm.execute(&mut console) {
        Ok(()) => {
            vm.print_memory_stats();
        }
        Err(e) => {
            eprintln!("vm error: {}", e);
            vm.print_stack();
            vm.print_globals();
            vm.print_memory_stats();
            exit(1);
        }
    }
}
